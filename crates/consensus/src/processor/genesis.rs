// Path: crates/consensus/src/processor/genesis.rs
//! Builds the genesis block with the local node as the only voter.

use super::{genesis_previous_block, DefaultProposalProcessor};
use crate::ballotbox::Ballotbox;
use crate::local::{LocalNode, LocalPolicy};
use crate::suffrage::FixedProposer;
use isaac_api::blockdata::BlockData;
use isaac_api::consensus::ProposalProcessor;
use isaac_api::storage::Database;
use isaac_networking::Nodepool;
use isaac_types::app::{
    Ballot, BallotFact, Block, Height, Operation, OperationFact, Round, Voteproof,
};
use isaac_types::config::{GenesisOperation, Policy};
use isaac_types::error::IsaacError;
use std::sync::Arc;

/// Generates block 0 from the configured genesis operations.
pub struct GenesisGenerator {
    local: Arc<LocalNode>,
    database: Arc<dyn Database>,
    blockdata: Arc<dyn BlockData>,
    operations: Vec<Operation>,
}

impl GenesisGenerator {
    pub fn new(
        local: Arc<LocalNode>,
        database: Arc<dyn Database>,
        blockdata: Arc<dyn BlockData>,
        genesis: &[GenesisOperation],
    ) -> Result<Self, IsaacError> {
        let operations = genesis
            .iter()
            .map(|g| {
                Operation::new(
                    OperationFact::key_value(g.key.clone(), g.value.clone()),
                    local.privatekey(),
                    local.network_id(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            local,
            database,
            blockdata,
            operations,
        })
    }

    fn vote(ballotbox: &Ballotbox, ballot: &Ballot) -> Result<Voteproof, IsaacError> {
        match ballotbox.vote(ballot)? {
            (_, Some(vp)) if vp.is_majority() => Ok(vp),
            (result, _) => Err(IsaacError::Invariant(format!(
                "genesis {} ballot ended {result}",
                ballot.stage()
            ))),
        }
    }

    /// Runs INIT, PROPOSAL and ACCEPT for height 0 and stores the block.
    pub async fn generate(&self) -> Result<Block, IsaacError> {
        if let Some(head) = self.database.last_manifest().await? {
            return Err(IsaacError::Invariant(format!(
                "genesis over existing block {}",
                head.height()
            )));
        }
        let address = self.local.address().clone();
        let (height, round) = (Height::GENESIS, Round::ZERO);

        let suffrage = Arc::new(FixedProposer::new(address.clone(), vec![address.clone()])?);
        let policy = Arc::new(LocalPolicy::new(Policy {
            threshold_ratio: 100.0,
            number_of_acting_suffrage_nodes: 1,
            ..Policy::default()
        }));
        let ballotbox = Ballotbox::new(suffrage.clone(), policy.clone());
        let nodepool = Arc::new(Nodepool::new(address.clone(), self.local.publickey()));
        let processor = DefaultProposalProcessor::new(
            self.local.clone(),
            self.database.clone(),
            self.blockdata.clone(),
            suffrage,
            nodepool,
            policy,
        );

        let init = self.local.ballot(
            BallotFact::Init {
                height,
                round,
                previous_block: genesis_previous_block(self.local.network_id()),
            },
            None,
        )?;
        let init_vp = Self::vote(&ballotbox, &init)?;

        let (operations, seals) = if self.operations.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let seal = self.local.seal(self.operations.clone())?;
            self.database.new_seals(&[seal.clone().into()]).await?;
            (
                self.operations.iter().map(|op| op.fact_hash().clone()).collect(),
                vec![seal.hash().clone()],
            )
        };
        let proposal = self.local.ballot(
            BallotFact::Proposal {
                height,
                round,
                proposer: address,
                operations,
                seals,
            },
            Some(init_vp.clone()),
        )?;
        self.database.new_proposal(&proposal).await?;

        let manifest = processor.process_init(proposal.fact_hash(), &init_vp).await?;
        let accept = self.local.ballot(
            BallotFact::Accept {
                height,
                round,
                proposal: proposal.fact_hash().clone(),
                new_block: manifest.hash().clone(),
            },
            Some(init_vp),
        )?;
        let accept_vp = Self::vote(&ballotbox, &accept)?;
        let block = processor
            .process_accept(proposal.fact_hash(), &accept_vp)
            .await?;

        tracing::info!(
            target: "consensus",
            event = "genesis",
            block = %block.hash(),
            operations = block.operations.len(),
            "genesis block created"
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_storage::{LocalFsBlockData, RedbDatabase};
    use isaac_test_utils::fixtures::{self, TestNode};
    use isaac_types::app::{Stage, Value};
    use std::time::Duration;

    #[tokio::test]
    async fn test_genesis_with_operations() {
        let dir = fixtures::tempdir();
        let node = TestNode::new("n0");
        let db = Arc::new(RedbDatabase::open(dir.path().join("db"), Duration::from_secs(2)).unwrap());
        let blockdata =
            Arc::new(LocalFsBlockData::open(dir.path().join("bd"), Duration::from_secs(60)).unwrap());
        let local = Arc::new(LocalNode::new(node.address.clone(), node.key.clone(), fixtures::NETWORK_ID));
        let generator = GenesisGenerator::new(
            local,
            db.clone(),
            blockdata.clone(),
            &[GenesisOperation {
                key: "k".into(),
                value: vec![0x01],
            }],
        )
        .unwrap();

        let block = generator.generate().await.unwrap();
        assert_eq!(block.height(), Height::GENESIS);
        assert!(block.is_valid(fixtures::NETWORK_ID).is_ok());
        assert_eq!(block.states.len(), 1);
        assert_eq!(block.states[0].key(), "k");
        assert_eq!(block.states[0].value(), Some(&Value::bytes(vec![0x01])));
        assert!(block.init_voteproof.is_majority());
        assert!(block.accept_voteproof.is_majority());
        assert_eq!(
            db.voteproof(Height::GENESIS, Stage::Accept).await.unwrap().map(|vp| vp.stage()),
            Some(Stage::Accept)
        );

        // a second run refuses to overwrite the chain
        assert!(matches!(generator.generate().await, Err(IsaacError::Invariant(_))));
    }
}
