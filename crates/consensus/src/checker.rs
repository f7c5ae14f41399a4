// Path: crates/consensus/src/checker.rs
//! Checks applied to every incoming ballot before it is voted or stored.

use crate::local::LocalPolicy;
use isaac_api::consensus::Suffrage;
use isaac_networking::Nodepool;
use isaac_types::app::{Ballot, Height, Stage, Timestamp};
use isaac_types::error::BallotError;
use std::sync::Arc;

/// Verifies ballots against the local view of the network.
pub struct BallotChecker {
    network_id: Vec<u8>,
    suffrage: Arc<dyn Suffrage>,
    nodepool: Arc<Nodepool>,
    policy: Arc<LocalPolicy>,
}

impl BallotChecker {
    pub fn new(
        network_id: impl Into<Vec<u8>>,
        suffrage: Arc<dyn Suffrage>,
        nodepool: Arc<Nodepool>,
        policy: Arc<LocalPolicy>,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            suffrage,
            nodepool,
            policy,
        }
    }

    /// Checks `ballot` given the local head height.
    ///
    /// A PROPOSAL must come from the proposer of its round; every other
    /// stage must come from an acting node.
    pub fn check(&self, ballot: &Ballot, head: Height) -> Result<(), BallotError> {
        ballot.is_valid(&self.network_id)?;

        let timespan = self.policy.get().timespan_valid_ballot;
        if Timestamp::now().distance(ballot.signed_at()) > timespan {
            return Err(BallotError::Expired);
        }

        let (height, round, node) = (ballot.height(), ballot.round(), ballot.node());
        let outsider = || BallotError::NotInSuffrage {
            node: node.clone(),
            height,
            round,
        };
        if !self.suffrage.is_inside(node) {
            return Err(outsider());
        }
        match self.nodepool.publickey(node) {
            Some(known) if known == *ballot.signer() => {}
            _ => return Err(BallotError::InvalidSignature(node.clone())),
        }

        if height < head {
            return Err(BallotError::Stale { height, head });
        }

        let allowed = match ballot.stage() {
            Stage::Proposal => self.suffrage.is_proposer(height, round, node),
            _ => self.suffrage.is_acting(height, round, node),
        };
        if !allowed {
            return Err(outsider());
        }
        Ok(())
    }
}
