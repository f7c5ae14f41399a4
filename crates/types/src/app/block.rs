// Path: crates/types/src/app/block.rs
//! Manifests, blocks and block data maps.

use crate::app::{
    Address, Ballot, BallotFact, FixedTree, Hash, Height, Operation, Round, Stage, State,
    Timestamp, Voteproof,
};
use crate::error::BlockError;
use crate::hint::{hints, Hint, Hinter};
use isaac_crypto::sign::Publickey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The header of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    height: Height,
    round: Round,
    proposal: Hash,
    previous_block: Hash,
    operations_root: Option<Hash>,
    states_root: Option<Hash>,
    created_at: Timestamp,
    confirmed_at: Option<Timestamp>,
    hash: Hash,
}

impl Manifest {
    /// Builds an unconfirmed manifest and computes its block hash.
    pub fn new(
        height: Height,
        round: Round,
        proposal: Hash,
        previous_block: Hash,
        operations_root: Option<Hash>,
        states_root: Option<Hash>,
    ) -> Self {
        let hash = Self::block_hash(
            height,
            round,
            &proposal,
            &previous_block,
            operations_root.as_ref(),
            states_root.as_ref(),
        );
        Self {
            height,
            round,
            proposal,
            previous_block,
            operations_root,
            states_root,
            created_at: Timestamp::now(),
            confirmed_at: None,
            hash,
        }
    }

    /// `SHA-256(height ‖ round ‖ proposal ‖ previous_block ‖ operations_root ‖ states_root)`.
    pub fn block_hash(
        height: Height,
        round: Round,
        proposal: &Hash,
        previous_block: &Hash,
        operations_root: Option<&Hash>,
        states_root: Option<&Hash>,
    ) -> Hash {
        Hash::sha256_concat([
            height.to_be_bytes().as_slice(),
            round.to_be_bytes().as_slice(),
            proposal.as_bytes(),
            previous_block.as_bytes(),
            operations_root.map(Hash::as_bytes).unwrap_or_default(),
            states_root.map(Hash::as_bytes).unwrap_or_default(),
        ])
    }

    /// Recomputes the block hash from the header fields.
    pub fn generate_hash(&self) -> Hash {
        Self::block_hash(
            self.height,
            self.round,
            &self.proposal,
            &self.previous_block,
            self.operations_root.as_ref(),
            self.states_root.as_ref(),
        )
    }

    /// Returns a copy confirmed at `at`. The block hash does not change.
    pub fn confirm(&self, at: Timestamp) -> Self {
        Self {
            confirmed_at: Some(at),
            ..self.clone()
        }
    }

    /// Height.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Round.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Proposal fact hash.
    pub fn proposal(&self) -> &Hash {
        &self.proposal
    }

    /// Hash of the block at `height - 1`.
    pub fn previous_block(&self) -> &Hash {
        &self.previous_block
    }

    /// Root of the operations tree.
    pub fn operations_root(&self) -> Option<&Hash> {
        self.operations_root.as_ref()
    }

    /// Root of the states tree.
    pub fn states_root(&self) -> Option<&Hash> {
        self.states_root.as_ref()
    }

    /// When the manifest was built.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// When the ACCEPT voteproof confirmed it.
    pub fn confirmed_at(&self) -> Option<Timestamp> {
        self.confirmed_at
    }

    /// The block hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Checks the stored block hash.
    pub fn is_valid(&self) -> Result<(), BlockError> {
        let expected = self.generate_hash();
        if expected != self.hash {
            return Err(BlockError::BlockHashMismatch {
                expected,
                got: self.hash.clone(),
            });
        }
        if self.height < Height::GENESIS {
            return Err(BlockError::Invalid(format!("manifest at {}", self.height)));
        }
        Ok(())
    }
}

impl Hinter for Manifest {
    fn hint(&self) -> Hint {
        hints::MANIFEST
    }
}

/// One suffrage member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffrageNode {
    /// Node address.
    pub address: Address,
    /// Node key.
    pub publickey: Publickey,
}

/// The suffrage that produced a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffrageInfo {
    /// Proposer of the block's round.
    pub proposer: Address,
    /// Acting members.
    pub nodes: Vec<SuffrageNode>,
}

impl SuffrageInfo {
    /// The key of `address`, if it is a member.
    pub fn publickey(&self, address: &Address) -> Option<&Publickey> {
        self.nodes
            .iter()
            .find(|n| n.address == *address)
            .map(|n| &n.publickey)
    }
}

impl Hinter for SuffrageInfo {
    fn hint(&self) -> Hint {
        hints::SUFFRAGE_INFO
    }
}

/// The value hash stored for an operation in the operations tree.
pub fn operation_tree_value(fact_hash: &Hash, in_state: bool) -> Hash {
    tree_value(fact_hash.as_bytes(), in_state)
}

fn tree_value(fact: &[u8], in_state: bool) -> Hash {
    Hash::sha256_concat([fact, &[u8::from(in_state)]])
}

/// A complete block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Header.
    pub manifest: Manifest,
    /// Operations in proposal order, including rejected ones.
    pub operations: Vec<Operation>,
    /// Tree over operation fact hashes.
    pub operations_tree: FixedTree,
    /// States written by the block, sorted by key.
    pub states: Vec<State>,
    /// Tree over state keys.
    pub states_tree: FixedTree,
    /// The INIT voteproof that opened the round.
    pub init_voteproof: Voteproof,
    /// The ACCEPT voteproof that confirmed the block.
    pub accept_voteproof: Voteproof,
    /// The suffrage of the round.
    pub suffrage_info: SuffrageInfo,
    /// The proposal ballot.
    pub proposal: Ballot,
}

impl Block {
    /// Height.
    pub fn height(&self) -> Height {
        self.manifest.height()
    }

    /// Block hash.
    pub fn hash(&self) -> &Hash {
        self.manifest.hash()
    }

    /// Checks the manifest against the trees, the states, the proposal and
    /// both voteproofs.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), BlockError> {
        self.manifest.is_valid()?;
        let invalid = |msg: String| BlockError::Invalid(msg);

        self.operations_tree.verify()?;
        if self.operations_tree.root_hash() != self.manifest.operations_root() {
            return Err(invalid("operations root mismatch".into()));
        }
        if self.operations_tree.len() < self.operations.len() {
            return Err(invalid("operations tree size mismatch".into()));
        }
        for op in &self.operations {
            if self.operations_tree.get(op.fact_hash().as_bytes()).is_none() {
                return Err(invalid(format!("operation {} not in tree", op.fact_hash())));
            }
        }
        // facts no seal carried are listed as rejected, without an operation
        for node in self.operations_tree.nodes() {
            let carried = self
                .operations
                .iter()
                .any(|op| op.fact_hash().as_bytes() == node.key.as_slice());
            if !carried && node.value_hash != tree_value(&node.key, false) {
                return Err(invalid("unknown fact marked as applied".into()));
            }
        }

        self.states_tree.verify()?;
        if self.states_tree.root_hash() != self.manifest.states_root() {
            return Err(invalid("states root mismatch".into()));
        }
        if self.states_tree.len() != self.states.len() {
            return Err(invalid("states tree size mismatch".into()));
        }
        for st in &self.states {
            st.is_valid().map_err(|e| invalid(e.to_string()))?;
            let hash = st
                .hash()
                .ok_or_else(|| invalid(format!("state {} without hash", st.key())))?;
            match self.states_tree.get(st.key().as_bytes()) {
                Some(node) if node.value_hash == *hash => {}
                _ => return Err(invalid(format!("state {} not in tree", st.key()))),
            }
            if st.height() != self.height() {
                return Err(invalid(format!("state {} of another height", st.key())));
            }
        }

        if self.proposal.fact_hash() != self.manifest.proposal() {
            return Err(invalid("proposal hash mismatch".into()));
        }
        self.proposal
            .is_valid(network_id)
            .map_err(|e| invalid(e.to_string()))?;

        self.check_voteproof(&self.init_voteproof, Stage::Init, network_id)?;
        self.check_voteproof(&self.accept_voteproof, Stage::Accept, network_id)?;
        match self.init_voteproof.majority() {
            Some(BallotFact::Init { previous_block, .. })
                if previous_block == self.manifest.previous_block() => {}
            _ => return Err(invalid("init voteproof previous block mismatch".into())),
        }
        match self.accept_voteproof.majority() {
            Some(fact) if fact.new_block() == Some(self.hash()) => {}
            _ => {
                return Err(BlockError::BlockHashMismatch {
                    expected: self.hash().clone(),
                    got: self
                        .accept_voteproof
                        .majority()
                        .and_then(BallotFact::new_block)
                        .cloned()
                        .unwrap_or_else(|| Hash::sha256([])),
                })
            }
        }
        Ok(())
    }

    fn check_voteproof(
        &self,
        vp: &Voteproof,
        stage: Stage,
        network_id: &[u8],
    ) -> Result<(), BlockError> {
        if vp.stage() != stage || vp.height() != self.height() || vp.round() != self.manifest.round() {
            return Err(BlockError::Invalid(format!(
                "{stage} voteproof of {}/{}/{}",
                vp.height(),
                vp.round(),
                vp.stage()
            )));
        }
        if !vp.is_majority() {
            return Err(BlockError::Invalid(format!("{stage} voteproof is not majority")));
        }
        vp.is_valid(network_id)
            .map_err(|e| BlockError::Invalid(e.to_string()))
    }
}

impl Hinter for Block {
    fn hint(&self) -> Hint {
        hints::BLOCK
    }
}

/// The named artifacts a block is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockDataType {
    /// The manifest.
    Manifest,
    /// The operations.
    Operations,
    /// The operations tree.
    OperationsTree,
    /// The states.
    States,
    /// The states tree.
    StatesTree,
    /// The INIT voteproof.
    InitVoteproof,
    /// The ACCEPT voteproof.
    AcceptVoteproof,
    /// The suffrage info.
    SuffrageInfo,
    /// The proposal.
    Proposal,
}

impl BlockDataType {
    /// Every item, in write order.
    pub const ALL: [BlockDataType; 9] = [
        Self::Manifest,
        Self::Operations,
        Self::OperationsTree,
        Self::States,
        Self::StatesTree,
        Self::InitVoteproof,
        Self::AcceptVoteproof,
        Self::SuffrageInfo,
        Self::Proposal,
    ];

    /// The name used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::Operations => "operations",
            Self::OperationsTree => "operations_tree",
            Self::States => "states",
            Self::StatesTree => "states_tree",
            Self::InitVoteproof => "init_voteproof",
            Self::AcceptVoteproof => "accept_voteproof",
            Self::SuffrageInfo => "suffrage_info",
            Self::Proposal => "proposal",
        }
    }

    /// Parses a file-name component.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for BlockDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one artifact of a block is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDataMapItem {
    /// Hex SHA-256 of the uncompressed body.
    pub checksum: String,
    /// Location relative to the block data root.
    pub path: String,
}

/// The index of every artifact of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDataMap {
    /// Height.
    pub height: Height,
    /// Block hash.
    pub block: Hash,
    /// Items by type.
    pub items: BTreeMap<BlockDataType, BlockDataMapItem>,
    /// When the files were written.
    pub written_at: Timestamp,
}

impl BlockDataMap {
    /// An empty map for `(height, block)`.
    pub fn new(height: Height, block: Hash) -> Self {
        Self {
            height,
            block,
            items: BTreeMap::new(),
            written_at: Timestamp::now(),
        }
    }

    /// Whether every item type is present.
    pub fn is_complete(&self) -> bool {
        BlockDataType::ALL.iter().all(|t| self.items.contains_key(t))
    }
}

impl Hinter for BlockDataMap {
    fn hint(&self) -> Hint {
        hints::BLOCKDATA_MAP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_layout() {
        let proposal = Hash::sha256(b"p");
        let prev = Hash::sha256(b"prev");
        let ops = Hash::sha256(b"ops");
        let m = Manifest::new(Height(5), Round(2), proposal.clone(), prev.clone(), Some(ops.clone()), None);
        let expected = Hash::sha256(
            [
                5i64.to_be_bytes().as_slice(),
                2u64.to_be_bytes().as_slice(),
                proposal.as_bytes(),
                prev.as_bytes(),
                ops.as_bytes(),
            ]
            .concat(),
        );
        assert_eq!(m.hash(), &expected);
        assert!(m.is_valid().is_ok());
    }

    #[test]
    fn test_confirm_keeps_hash() {
        let m = Manifest::new(Height(1), Round(0), Hash::sha256(b"p"), Hash::sha256(b"q"), None, None);
        let confirmed = m.confirm(Timestamp(42));
        assert_eq!(confirmed.hash(), m.hash());
        assert_eq!(confirmed.confirmed_at(), Some(Timestamp(42)));
        assert!(confirmed.is_valid().is_ok());
    }

    #[test]
    fn test_operation_tree_value() {
        let fact = Hash::sha256(b"fact");
        assert_ne!(operation_tree_value(&fact, true), operation_tree_value(&fact, false));
        assert_eq!(
            operation_tree_value(&fact, true),
            Hash::sha256([fact.as_bytes(), &[1u8]].concat())
        );
    }

    #[test]
    fn test_blockdata_type_names() {
        for t in BlockDataType::ALL {
            assert_eq!(BlockDataType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(BlockDataType::from_name("nope"), None);
    }
}
