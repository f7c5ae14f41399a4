// Path: crates/networking/src/nodepool.rs
//! Known remote nodes and their channels.

use crate::channel::Channel;
use futures::future::join_all;
use isaac_crypto::sign::Publickey;
use isaac_types::app::{Address, Seal};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
struct Entry {
    publickey: Publickey,
    channel: Option<Arc<dyn Channel>>,
}

/// The local node plus every known remote node.
pub struct Nodepool {
    local: Address,
    local_publickey: Publickey,
    nodes: RwLock<BTreeMap<Address, Entry>>,
}

impl std::fmt::Debug for Nodepool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nodepool")
            .field("local", &self.local)
            .field("remotes", &self.nodes.read().len())
            .finish()
    }
}

impl Nodepool {
    /// A pool knowing only the local node.
    pub fn new(local: Address, local_publickey: Publickey) -> Self {
        Self {
            local,
            local_publickey,
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// The local node.
    pub fn local(&self) -> &Address {
        &self.local
    }

    /// Adds or replaces a remote node. A node without a channel is known
    /// by key only.
    pub fn add(&self, address: Address, publickey: Publickey, channel: Option<Arc<dyn Channel>>) {
        if address == self.local {
            return;
        }
        self.nodes
            .write()
            .insert(address, Entry { publickey, channel });
    }

    /// Forgets a remote node.
    pub fn remove(&self, address: &Address) -> bool {
        self.nodes.write().remove(address).is_some()
    }

    /// The key of a known node, the local one included.
    pub fn publickey(&self, address: &Address) -> Option<Publickey> {
        if *address == self.local {
            return Some(self.local_publickey.clone());
        }
        self.nodes.read().get(address).map(|e| e.publickey.clone())
    }

    /// The channel to a remote node.
    pub fn channel(&self, address: &Address) -> Option<Arc<dyn Channel>> {
        self.nodes.read().get(address).and_then(|e| e.channel.clone())
    }

    /// Every remote node with a channel, sorted by address.
    pub fn channels(&self) -> Vec<Arc<dyn Channel>> {
        self.nodes
            .read()
            .values()
            .filter_map(|e| e.channel.clone())
            .collect()
    }

    /// Every remote address, sorted.
    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Number of remote nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no remote node is known.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Sends `seal` to every remote node concurrently. Returns how many
    /// deliveries succeeded; failures are logged and otherwise ignored.
    pub async fn broadcast(&self, seal: &Seal) -> usize {
        let channels = self.channels();
        let sends = channels.iter().map(|ch| {
            let seal = seal.clone();
            async move { (ch.address().clone(), ch.send_seal(seal).await) }
        });
        let mut delivered = 0;
        for (address, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    target: "network",
                    to = %address,
                    seal = %seal.hash(),
                    error = %e,
                    "seal not delivered"
                ),
            }
        }
        delivered
    }
}
