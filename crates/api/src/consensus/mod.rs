// Path: crates/api/src/consensus/mod.rs

//! Seams of the consensus core: the suffrage, the proposal processor and
//! the observable state of a node.

use async_trait::async_trait;
use isaac_types::app::{Address, Block, Hash, Height, Manifest, Round, Voteproof};
use isaac_types::error::ProcessorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The consensus state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateKind {
    /// Validating the local chain.
    Booting,
    /// Waiting to enter live consensus.
    Joining,
    /// Voting.
    Consensus,
    /// Catching up from peers.
    Syncing,
    /// Stopped voting after an unrecoverable failure.
    Broken,
}

impl StateKind {
    /// The upper-case label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booting => "BOOTING",
            Self::Joining => "JOINING",
            Self::Consensus => "CONSENSUS",
            Self::Syncing => "SYNCING",
            Self::Broken => "BROKEN",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The proposer and acting members of one `(height, round)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingSuffrage {
    /// Height.
    pub height: Height,
    /// Round.
    pub round: Round,
    /// The proposer.
    pub proposer: Address,
    /// Acting members, sorted.
    pub nodes: Vec<Address>,
}

impl ActingSuffrage {
    /// Whether `node` acts.
    pub fn exists(&self, node: &Address) -> bool {
        self.nodes.binary_search(node).is_ok()
    }
}

/// Selects the proposer and acting set.
pub trait Suffrage: Send + Sync {
    /// Name of the selection rule.
    fn name(&self) -> &'static str;

    /// Every member, sorted.
    fn nodes(&self) -> &[Address];

    /// The acting suffrage of `(height, round)`.
    fn acting(&self, height: Height, round: Round) -> ActingSuffrage;

    /// Whether `node` is a member.
    fn is_inside(&self, node: &Address) -> bool {
        self.nodes().binary_search(node).is_ok()
    }

    /// Whether `node` acts at `(height, round)`.
    fn is_acting(&self, height: Height, round: Round, node: &Address) -> bool {
        self.acting(height, round).exists(node)
    }

    /// Whether `node` proposes at `(height, round)`.
    fn is_proposer(&self, height: Height, round: Round, node: &Address) -> bool {
        self.acting(height, round).proposer == *node
    }
}

/// Turns an accepted proposal into a stored block.
#[async_trait]
pub trait ProposalProcessor: Send + Sync {
    /// Builds the candidate block of `proposal` under `init`. Idempotent per
    /// proposal.
    async fn process_init(
        &self,
        proposal: &Hash,
        init: &Voteproof,
    ) -> Result<Manifest, ProcessorError>;

    /// Confirms and stores the block of `proposal` under `accept`.
    async fn process_accept(
        &self,
        proposal: &Hash,
        accept: &Voteproof,
    ) -> Result<Block, ProcessorError>;

    /// Drops any pending block.
    async fn cancel(&self);
}
