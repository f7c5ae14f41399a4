// Path: crates/networking/src/channel.rs
//! Trait definitions for talking to a peer.

use async_trait::async_trait;
use isaac_api::consensus::StateKind;
use isaac_crypto::sign::Publickey;
use isaac_types::app::{Address, Block, Hash, Height, Manifest, Seal};
use isaac_types::error::ChannelError;
use serde::{Deserialize, Serialize};

/// What a node reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node address.
    pub address: Address,
    /// Node key.
    pub publickey: Publickey,
    /// The network the node signs for.
    pub network_id: Vec<u8>,
    /// Current consensus state.
    pub state: StateKind,
    /// Manifest of the highest stored block.
    pub last_manifest: Option<Manifest>,
    /// Suffrage members known to the node.
    pub suffrage: Vec<Address>,
}

impl NodeInfo {
    /// Height of the last stored block, `Height::NIL` when empty.
    pub fn last_height(&self) -> Height {
        self.last_manifest
            .as_ref()
            .map(Manifest::height)
            .unwrap_or(Height::NIL)
    }
}

/// The calling side of a connection to one remote node.
///
/// Every call returns within a bounded time or fails with
/// [`ChannelError::Timeout`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// The remote node.
    fn address(&self) -> &Address;

    /// Seals the remote node has among `hashes`.
    async fn seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError>;

    /// Delivers one seal.
    async fn send_seal(&self, seal: Seal) -> Result<(), ChannelError>;

    /// Stored blocks among `heights`, in height order.
    async fn blocks(&self, heights: &[Height]) -> Result<Vec<Block>, ChannelError>;

    /// Stored manifests among `heights`, in height order.
    async fn manifests(&self, heights: &[Height]) -> Result<Vec<Manifest>, ChannelError>;

    /// The remote node's self report.
    async fn node_info(&self) -> Result<NodeInfo, ChannelError>;
}

/// The serving side of [`Channel`], implemented by the node runtime.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Accepts one seal from `from`.
    async fn handle_seal(&self, from: &Address, seal: Seal) -> Result<(), ChannelError>;

    /// Looks up seals.
    async fn get_seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError>;

    /// Looks up blocks.
    async fn get_blocks(&self, heights: &[Height]) -> Result<Vec<Block>, ChannelError>;

    /// Looks up manifests.
    async fn get_manifests(&self, heights: &[Height]) -> Result<Vec<Manifest>, ChannelError>;

    /// Reports the local node.
    async fn node_info(&self) -> Result<NodeInfo, ChannelError>;
}
