// Path: crates/consensus/src/processor/mod.rs
//! Turns an accepted proposal into a stored block.
//!
//! `process_init` builds the candidate block in memory and keeps it as the
//! single pending block. `process_accept` confirms that block, writes its
//! artifacts through a block data session and then commits it to the
//! database in one transaction. Artifacts written for a block whose commit
//! failed are marked removed.

mod error;
mod genesis;

pub use error::ErrorProposalProcessor;
pub use genesis::GenesisGenerator;

use crate::local::{LocalNode, LocalPolicy};
use crate::metrics::metrics;
use crate::operation::process_operation;
use async_trait::async_trait;
use isaac_api::blockdata::BlockData;
use isaac_api::consensus::{ProposalProcessor, Suffrage};
use isaac_api::storage::Database;
use isaac_networking::Nodepool;
use isaac_state::pool::StatePool;
use isaac_state::tree::avl::AvlTreeBuilder;
use isaac_telemetry::time;
use isaac_types::app::{
    operation_tree_value, Address, Ballot, BallotFact, Block, FixedTree, Hash, Height, Manifest,
    Operation, Round, Seal, Stage, State, SuffrageInfo, SuffrageNode, Timestamp, Voteproof,
};
use isaac_types::error::{BlockError, ProcessorError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `previous_block` of the genesis block.
pub fn genesis_previous_block(network_id: &[u8]) -> Hash {
    Hash::sha256(network_id)
}

/// A block built on INIT, waiting for its ACCEPT voteproof.
struct Pending {
    proposal: Ballot,
    manifest: Manifest,
    operations: Vec<Operation>,
    operations_tree: FixedTree,
    states: Vec<State>,
    states_tree: FixedTree,
    init_voteproof: Voteproof,
    suffrage_info: SuffrageInfo,
}

impl Pending {
    fn into_block(self, accept: Voteproof) -> Block {
        Block {
            manifest: self.manifest.confirm(Timestamp::now()),
            operations: self.operations,
            operations_tree: self.operations_tree,
            states: self.states,
            states_tree: self.states_tree,
            init_voteproof: self.init_voteproof,
            accept_voteproof: accept,
            suffrage_info: self.suffrage_info,
            proposal: self.proposal,
        }
    }
}

fn wrong(msg: impl Into<String>) -> ProcessorError {
    ProcessorError::WrongVoteproof(msg.into())
}

/// The proposal processor used by live consensus and genesis.
pub struct DefaultProposalProcessor {
    local: Arc<LocalNode>,
    database: Arc<dyn Database>,
    blockdata: Arc<dyn BlockData>,
    suffrage: Arc<dyn Suffrage>,
    nodepool: Arc<Nodepool>,
    policy: Arc<LocalPolicy>,
    pending: Mutex<Option<Pending>>,
}

impl DefaultProposalProcessor {
    pub fn new(
        local: Arc<LocalNode>,
        database: Arc<dyn Database>,
        blockdata: Arc<dyn BlockData>,
        suffrage: Arc<dyn Suffrage>,
        nodepool: Arc<Nodepool>,
        policy: Arc<LocalPolicy>,
    ) -> Self {
        Self {
            local,
            database,
            blockdata,
            suffrage,
            nodepool,
            policy,
            pending: Mutex::new(None),
        }
    }

    /// The manifest of the pending block, if any.
    pub async fn pending_manifest(&self) -> Option<Manifest> {
        self.pending.lock().await.as_ref().map(|p| p.manifest.clone())
    }

    async fn prepare(&self, proposal_hash: &Hash, init: &Voteproof) -> Result<Pending, ProcessorError> {
        let proposal = self
            .database
            .proposal_by_fact(proposal_hash)
            .await?
            .ok_or_else(|| ProcessorError::ProposalNotFound(proposal_hash.clone()))?;
        let BallotFact::Proposal {
            height,
            round,
            proposer,
            operations,
            seals,
        } = proposal.fact()
        else {
            return Err(wrong(format!("{proposal_hash} is not a proposal")));
        };
        let (height, round) = (*height, *round);

        if init.stage() != Stage::Init || !init.is_majority() {
            return Err(wrong("INIT majority expected"));
        }
        if init.height() != height || init.round() != round {
            return Err(wrong(format!(
                "proposal {height}/{round} under voteproof {}/{}",
                init.height(),
                init.round()
            )));
        }
        let Some(BallotFact::Init { previous_block, .. }) = init.majority() else {
            return Err(wrong("INIT majority without INIT fact"));
        };

        let (expected_height, previous) = match self.database.last_manifest().await? {
            Some(head) => (head.height().next(), head.hash().clone()),
            None => (
                Height::GENESIS,
                genesis_previous_block(self.local.network_id()),
            ),
        };
        if height != expected_height {
            return Err(wrong(format!(
                "proposal height {height}, expected {expected_height}"
            )));
        }
        if *previous_block != previous {
            return Err(wrong(format!(
                "voteproof previous block {previous_block}, local head {previous}"
            )));
        }

        let (ops, unknown) = self.collect_operations(proposer, operations, seals).await?;

        let pool = StatePool::new(self.database.clone(), height);
        let mut operations_tree = AvlTreeBuilder::new();
        for fact in &unknown {
            operations_tree.insert(fact.as_bytes().to_vec(), operation_tree_value(fact, false))?;
        }
        for op in &ops {
            pool.add_operations(std::slice::from_ref(op));
            let in_state = process_operation(&pool, op).await?;
            operations_tree.insert(
                op.fact_hash().as_bytes().to_vec(),
                operation_tree_value(op.fact_hash(), in_state),
            )?;
        }
        let ops = pool.added_operations();

        let mut states = Vec::new();
        let mut states_tree = AvlTreeBuilder::new();
        for updater in pool.updates() {
            let st = updater.finish(&previous)?;
            let hash = st
                .hash()
                .cloned()
                .ok_or_else(|| BlockError::Invalid(format!("state {} without hash", st.key())))?;
            states_tree.insert(st.key().as_bytes().to_vec(), hash)?;
            states.push(st);
        }
        pool.done();

        let operations_tree = operations_tree.build()?;
        let states_tree = states_tree.build()?;
        let manifest = Manifest::new(
            height,
            round,
            proposal_hash.clone(),
            previous,
            operations_tree.root_hash().cloned(),
            states_tree.root_hash().cloned(),
        );
        let suffrage_info = self.suffrage_info(height, round)?;

        tracing::debug!(
            target: "processor",
            height = height.0,
            round = round.0,
            block = %manifest.hash(),
            operations = ops.len(),
            states = states.len(),
            "proposal processed"
        );
        Ok(Pending {
            proposal,
            manifest,
            operations: ops,
            operations_tree,
            states,
            states_tree,
            init_voteproof: init.clone(),
            suffrage_info,
        })
    }

    /// The operations listed by a proposal, in proposal order, and the listed
    /// facts none of its seals carries. Seals missing locally are fetched from
    /// the proposer and stored.
    async fn collect_operations(
        &self,
        proposer: &Address,
        facts: &[Hash],
        seals: &[Hash],
    ) -> Result<(Vec<Operation>, Vec<Hash>), ProcessorError> {
        let mut by_fact: HashMap<Hash, Operation> = HashMap::new();
        let mut missing = Vec::new();
        for hash in seals {
            match self.database.seal(hash).await? {
                Some(Seal::Operation(seal)) => {
                    for op in seal.operations() {
                        by_fact.insert(op.fact_hash().clone(), op.clone());
                    }
                }
                Some(Seal::Ballot(_)) => return Err(ProcessorError::SealNotFound(hash.clone())),
                None => missing.push(hash.clone()),
            }
        }

        if let Some(first) = missing.first() {
            let channel = self
                .nodepool
                .channel(proposer)
                .ok_or_else(|| ProcessorError::SealNotFound(first.clone()))?;
            let mut received = Vec::new();
            for seal in channel.seals(&missing).await? {
                if !missing.contains(seal.hash()) {
                    continue;
                }
                if let Err(e) = seal.is_valid(self.local.network_id()) {
                    tracing::warn!(target: "processor", seal = %seal.hash(), error = %e, "invalid seal from proposer");
                    continue;
                }
                if let Seal::Operation(op_seal) = &seal {
                    for op in op_seal.operations() {
                        by_fact.insert(op.fact_hash().clone(), op.clone());
                    }
                    received.push(seal);
                }
            }
            if let Some(absent) = missing
                .iter()
                .find(|h| !received.iter().any(|s| s.hash() == *h))
            {
                return Err(ProcessorError::SealNotFound(absent.clone()));
            }
            self.database.new_seals(&received).await?;
        }

        let mut out = Vec::with_capacity(facts.len());
        let mut unknown = Vec::new();
        for fact in facts {
            if out.iter().any(|op: &Operation| op.fact_hash() == fact)
                || self.database.has_operation(fact).await?
            {
                continue;
            }
            match by_fact.remove(fact) {
                Some(op) => out.push(op),
                None if !unknown.contains(fact) => {
                    tracing::debug!(target: "processor", fact = %fact, "fact not carried by any seal, rejected");
                    unknown.push(fact.clone());
                }
                None => {}
            }
        }
        Ok((out, unknown))
    }

    fn suffrage_info(&self, height: Height, round: Round) -> Result<SuffrageInfo, ProcessorError> {
        let acting = self.suffrage.acting(height, round);
        let nodes = acting
            .nodes
            .iter()
            .map(|address| {
                self.nodepool
                    .publickey(address)
                    .map(|publickey| SuffrageNode {
                        address: address.clone(),
                        publickey,
                    })
                    .ok_or_else(|| BlockError::Invalid(format!("no publickey for {address}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SuffrageInfo {
            proposer: acting.proposer,
            nodes,
        })
    }

    /// Writes the artifacts of `block` and commits it.
    async fn store(&self, block: &Block) -> Result<(), ProcessorError> {
        let height = block.height();
        let mut session = self.blockdata.new_session(height, block.hash()).await?;
        if let Err(e) = session.save_block(block).await {
            if let Err(ce) = session.cancel().await {
                tracing::warn!(target: "processor", height = height.0, error = %ce, "block data session not cancelled");
            }
            return Err(e.into());
        }
        let map = session.done().await?;

        let committed = async {
            let mut storage = self.database.open_block_storage(block.clone()).await?;
            storage.set_blockdata_map(map).await?;
            storage.commit().await
        }
        .await;
        if let Err(e) = committed {
            if let Err(re) = self.blockdata.remove(height).await {
                tracing::warn!(target: "processor", height = height.0, error = %re, "block data not removed");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ProposalProcessor for DefaultProposalProcessor {
    async fn process_init(
        &self,
        proposal: &Hash,
        init: &Voteproof,
    ) -> Result<Manifest, ProcessorError> {
        let mut pending = self.pending.lock().await;
        if let Some(p) = pending.as_ref() {
            if p.proposal.fact_hash() == proposal {
                return Ok(p.manifest.clone());
            }
            tracing::debug!(
                target: "processor",
                replaced = %p.proposal.fact_hash(),
                "pending block replaced"
            );
            *pending = None;
        }

        let _timer = time::proposal_processing(metrics());
        let timeout = self.policy.get().timeout_process_proposal;
        let prepared = tokio::time::timeout(timeout, self.prepare(proposal, init))
            .await
            .map_err(|_| ProcessorError::Timeout)??;
        let manifest = prepared.manifest.clone();
        *pending = Some(prepared);
        Ok(manifest)
    }

    async fn process_accept(
        &self,
        proposal: &Hash,
        accept: &Voteproof,
    ) -> Result<Block, ProcessorError> {
        let mut pending = self.pending.lock().await;
        let Some(prepared) = pending.take() else {
            return Err(ProcessorError::NotProcessed(proposal.clone()));
        };
        if prepared.proposal.fact_hash() != proposal {
            return Err(ProcessorError::NotProcessed(proposal.clone()));
        }
        if accept.stage() != Stage::Accept
            || accept.height() != prepared.manifest.height()
            || accept.round() != prepared.manifest.round()
        {
            return Err(wrong(format!(
                "{} voteproof of {}/{} for block {}/{}",
                accept.stage(),
                accept.height(),
                accept.round(),
                prepared.manifest.height(),
                prepared.manifest.round()
            )));
        }
        let new_block = match accept.majority() {
            Some(BallotFact::Accept {
                proposal: agreed,
                new_block,
                ..
            }) if agreed == proposal => new_block.clone(),
            _ => return Err(wrong("ACCEPT majority for another proposal")),
        };
        if new_block != *prepared.manifest.hash() {
            tracing::warn!(
                target: "processor",
                height = accept.height().0,
                round = accept.round().0,
                local = %prepared.manifest.hash(),
                agreed = %new_block,
                "agreed block differs from the local one"
            );
            return Err(BlockError::BlockHashMismatch {
                expected: prepared.manifest.hash().clone(),
                got: new_block,
            }
            .into());
        }

        let block = prepared.into_block(accept.clone());
        self.store(&block).await?;
        Ok(block)
    }

    async fn cancel(&self) {
        if let Some(p) = self.pending.lock().await.take() {
            tracing::debug!(
                target: "processor",
                height = p.manifest.height().0,
                round = p.manifest.round().0,
                "pending block cancelled"
            );
        }
    }
}
