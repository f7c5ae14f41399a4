// Path: crates/types/src/config/mod.rs

//! Node configuration.
//!
//! Loaded from TOML by the node binary. Every optional field carries a
//! `#[serde(default = "...")]` so a minimal file only names the node, its
//! key and its peers.

use crate::app::timing::nanos;
use crate::app::{Address, Height, Round};
use crate::error::StateError;
use isaac_crypto::sign::{Privatekey, Publickey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod policy;
pub use policy::*;

/// Durable storage locations and timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the redb database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Root directory of block data files.
    #[serde(default = "default_blockdata_path")]
    pub blockdata: PathBuf,
    /// How long a removed block data directory is kept.
    #[serde(default = "default_blockdata_remove_after", with = "nanos")]
    pub blockdata_remove_after: Duration,
    /// How often the cleaner looks for expired directories.
    #[serde(default = "default_blockdata_clean_interval", with = "nanos")]
    pub blockdata_clean_interval: Duration,
    /// Upper bound of a single database operation.
    #[serde(default = "default_exec_timeout", with = "nanos")]
    pub exec_timeout: Duration,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/isaac.redb")
}
fn default_blockdata_path() -> PathBuf {
    PathBuf::from("./data/blockdata")
}
fn default_blockdata_remove_after() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_blockdata_clean_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_exec_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            blockdata: default_blockdata_path(),
            blockdata_remove_after: default_blockdata_remove_after(),
            blockdata_clean_interval: default_blockdata_clean_interval(),
            exec_timeout: default_exec_timeout(),
        }
    }
}

/// How the proposer and acting set are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuffrageKind {
    /// One configured proposer; every node acts.
    FixedProposer,
    /// Proposer rotates by `(height + round) mod N`.
    Roundrobin,
}

/// Suffrage selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffrageConfig {
    /// The selection rule.
    #[serde(rename = "type")]
    pub kind: SuffrageKind,
    /// The proposer of `fixed-proposer`.
    #[serde(default)]
    pub proposer: Option<Address>,
    /// Suffrage members. Empty means the local node plus every known node.
    #[serde(default)]
    pub nodes: Vec<Address>,
}

/// A known remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Node address.
    pub address: Address,
    /// Node key.
    pub publickey: Publickey,
}

/// A key/value pair written by the genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisOperation {
    /// State key.
    pub key: String,
    /// Raw bytes value.
    pub value: Vec<u8>,
}

/// The failure injected at an [`ErrorPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPointKind {
    /// Fail with an error.
    Error,
    /// Produce a block with a wrong hash.
    WrongBlockHash,
}

/// A `(height, round)` where the processor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPoint {
    /// Height.
    pub height: Height,
    /// Round.
    pub round: Round,
    /// What to inject.
    #[serde(rename = "type")]
    pub kind: ErrorPointKind,
}

/// Injected processor failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPoints {
    /// Points hit while processing INIT.
    #[serde(default)]
    pub when_prepare: Vec<ErrorPoint>,
    /// Points hit while saving on ACCEPT.
    #[serde(default)]
    pub when_save: Vec<ErrorPoint>,
}

impl ErrorPoints {
    /// Whether no point is configured.
    pub fn is_empty(&self) -> bool {
        self.when_prepare.is_empty() && self.when_save.is_empty()
    }
}

/// The configuration of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network identifier mixed into every signature.
    pub network_id: String,
    /// Local node address.
    pub address: Address,
    /// Local key in `<base58>~<kind>` form.
    pub privatekey: String,
    /// Storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Consensus policy.
    #[serde(default)]
    pub policy: Policy,
    /// Suffrage selection.
    pub suffrage: SuffrageConfig,
    /// Every other known node.
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// State written by the genesis block.
    #[serde(default)]
    pub genesis_operations: Vec<GenesisOperation>,
    /// Injected processor failures.
    #[serde(default)]
    pub error_points: ErrorPoints,
    /// Address of the `/metrics` endpoint.
    #[serde(default)]
    pub telemetry_addr: Option<String>,
}

impl NodeConfig {
    /// Parses the local key.
    pub fn privatekey(&self) -> Result<Privatekey, StateError> {
        self.privatekey
            .parse()
            .map_err(|e| StateError::Validation(format!("privatekey: {e}")))
    }

    /// The suffrage members, sorted and deduplicated.
    pub fn suffrage_nodes(&self) -> Vec<Address> {
        let mut nodes = if self.suffrage.nodes.is_empty() {
            let mut all: Vec<Address> = self.nodes.iter().map(|n| n.address.clone()).collect();
            all.push(self.address.clone());
            all
        } else {
            self.suffrage.nodes.clone()
        };
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.network_id.is_empty() {
            return Err(StateError::Validation("network_id is empty".into()));
        }
        self.privatekey()?;
        self.policy.is_valid()?;
        let suffrage = self.suffrage_nodes();
        for node in &suffrage {
            if *node != self.address && !self.nodes.iter().any(|n| n.address == *node) {
                return Err(StateError::Validation(format!(
                    "suffrage node {node} has no node entry"
                )));
            }
        }
        if self.suffrage.kind == SuffrageKind::FixedProposer {
            match &self.suffrage.proposer {
                Some(p) if suffrage.contains(p) => {}
                Some(p) => {
                    return Err(StateError::Validation(format!(
                        "proposer {p} is not a suffrage node"
                    )))
                }
                None => {
                    return Err(StateError::Validation(
                        "fixed-proposer suffrage without proposer".into(),
                    ))
                }
            }
        }
        for op in &self.genesis_operations {
            if !crate::app::is_valid_key(&op.key) {
                return Err(StateError::InvalidKey(op.key.clone()));
            }
        }
        Ok(())
    }
}
