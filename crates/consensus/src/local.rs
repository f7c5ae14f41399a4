// Path: crates/consensus/src/local.rs
//! The identity of the local node and its live policy.

use arc_swap::ArcSwap;
use isaac_crypto::sign::{Privatekey, Publickey};
use isaac_types::app::{Address, Ballot, BallotFact, Operation, OperationSeal, Voteproof};
use isaac_types::config::Policy;
use isaac_types::error::{BallotError, SealError};
use std::sync::Arc;

/// The address, key and network of the local node.
#[derive(Clone)]
pub struct LocalNode {
    address: Address,
    key: Privatekey,
    network_id: Vec<u8>,
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNode")
            .field("address", &self.address)
            .field("publickey", &self.key.publickey())
            .finish_non_exhaustive()
    }
}

impl LocalNode {
    pub fn new(address: Address, key: Privatekey, network_id: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            key,
            network_id: network_id.into(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn publickey(&self) -> Publickey {
        self.key.publickey()
    }

    pub fn privatekey(&self) -> &Privatekey {
        &self.key
    }

    pub fn network_id(&self) -> &[u8] {
        &self.network_id
    }

    /// Signs `fact` as a ballot of the local node.
    pub fn ballot(
        &self,
        fact: BallotFact,
        voteproof: Option<Voteproof>,
    ) -> Result<Ballot, BallotError> {
        Ballot::new(
            fact,
            self.address.clone(),
            &self.key,
            &self.network_id,
            voteproof,
        )
    }

    /// Seals `operations` with the local key.
    pub fn seal(&self, operations: Vec<Operation>) -> Result<OperationSeal, SealError> {
        OperationSeal::new(operations, &self.key, &self.network_id)
    }
}

/// The active [`Policy`]. Readers never block writers.
#[derive(Debug)]
pub struct LocalPolicy(ArcSwap<Policy>);

impl LocalPolicy {
    pub fn new(policy: Policy) -> Self {
        Self(ArcSwap::from_pointee(policy))
    }

    /// A snapshot of the current policy.
    pub fn get(&self) -> Arc<Policy> {
        self.0.load_full()
    }

    /// Replaces the policy.
    pub fn set(&self, policy: Policy) {
        self.0.store(Arc::new(policy));
    }

    pub fn threshold_ratio(&self) -> f64 {
        self.0.load().threshold_ratio
    }
}

impl Default for LocalPolicy {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}
