// Path: crates/networking/src/local.rs
//! An in-process transport.
//!
//! Nodes register their [`ChannelHandler`] under their address. A
//! [`LocalChannel`] looks the handler up on every call, so a node that was
//! taken down or dropped becomes unreachable immediately. Seals are passed
//! through the hinted codec the same way a socket transport would.

use crate::channel::{Channel, ChannelHandler, NodeInfo};
use async_trait::async_trait;
use isaac_types::app::{Address, Block, Hash, Height, Manifest, Seal};
use isaac_types::codec::{decode_hinted, encode_hinted};
use isaac_types::error::ChannelError;
use isaac_types::hint::Hintset;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct Registry {
    handlers: HashMap<Address, Weak<dyn ChannelHandler>>,
    down: HashSet<Address>,
}

/// The set of nodes reachable in this process.
#[derive(Clone)]
pub struct LocalNetwork {
    registry: Arc<RwLock<Registry>>,
    hintset: Arc<Hintset>,
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("LocalNetwork")
            .field("nodes", &registry.handlers.len())
            .field("down", &registry.down.len())
            .finish()
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self {
            registry: Arc::default(),
            hintset: Arc::new(Hintset::isaac()),
        }
    }

    /// Makes `handler` reachable as `address`, replacing any previous one.
    pub fn register(&self, address: Address, handler: Weak<dyn ChannelHandler>) {
        let mut registry = self.registry.write();
        registry.down.remove(&address);
        registry.handlers.insert(address, handler);
    }

    /// Removes `address` from the network.
    pub fn unregister(&self, address: &Address) {
        self.registry.write().handlers.remove(address);
    }

    /// Makes `address` unreachable without unregistering it.
    pub fn set_down(&self, address: &Address) {
        self.registry.write().down.insert(address.clone());
    }

    /// Makes `address` reachable again.
    pub fn set_up(&self, address: &Address) {
        self.registry.write().down.remove(address);
    }

    /// Whether `address` is registered, alive and not down.
    pub fn is_reachable(&self, address: &Address) -> bool {
        self.handler(address).is_ok()
    }

    /// A channel from `from` to `target`.
    pub fn channel(&self, from: Address, target: Address, timeout: Duration) -> LocalChannel {
        LocalChannel {
            network: self.clone(),
            from,
            target,
            timeout,
        }
    }

    fn handler(&self, address: &Address) -> Result<Arc<dyn ChannelHandler>, ChannelError> {
        let registry = self.registry.read();
        if registry.down.contains(address) {
            return Err(ChannelError::Connection(format!("{address} is down")));
        }
        registry
            .handlers
            .get(address)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ChannelError::Connection(format!("{address} is not reachable")))
    }
}

/// A channel to one node of a [`LocalNetwork`].
#[derive(Clone, Debug)]
pub struct LocalChannel {
    network: LocalNetwork,
    from: Address,
    target: Address,
    timeout: Duration,
}

impl LocalChannel {
    async fn call<T, F, Fut>(&self, f: F) -> Result<T, ChannelError>
    where
        F: FnOnce(Arc<dyn ChannelHandler>) -> Fut,
        Fut: Future<Output = Result<T, ChannelError>>,
    {
        let handler = self.network.handler(&self.target)?;
        tokio::time::timeout(self.timeout, f(handler))
            .await
            .map_err(|_| ChannelError::Timeout)?
    }

    fn wire(&self, seal: &Seal) -> Result<Seal, ChannelError> {
        let blob =
            encode_hinted(seal).map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        decode_hinted(&blob, &self.network.hintset)
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Channel for LocalChannel {
    fn address(&self) -> &Address {
        &self.target
    }

    async fn seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError> {
        let seals = self.call(|h| async move { h.get_seals(hashes).await }).await?;
        seals.iter().map(|s| self.wire(s)).collect()
    }

    async fn send_seal(&self, seal: Seal) -> Result<(), ChannelError> {
        let seal = self.wire(&seal)?;
        let from = &self.from;
        self.call(|h| async move { h.handle_seal(from, seal).await })
            .await
    }

    async fn blocks(&self, heights: &[Height]) -> Result<Vec<Block>, ChannelError> {
        self.call(|h| async move { h.get_blocks(heights).await })
            .await
    }

    async fn manifests(&self, heights: &[Height]) -> Result<Vec<Manifest>, ChannelError> {
        self.call(|h| async move { h.get_manifests(heights).await })
            .await
    }

    async fn node_info(&self) -> Result<NodeInfo, ChannelError> {
        self.call(|h| async move { h.node_info().await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_api::consensus::StateKind;
    use isaac_test_utils::fixtures::{self, TestNode};
    use parking_lot::Mutex;

    struct Recorder {
        node: TestNode,
        received: Mutex<Vec<(Address, Seal)>>,
        delay: Duration,
    }

    #[async_trait]
    impl ChannelHandler for Recorder {
        async fn handle_seal(&self, from: &Address, seal: Seal) -> Result<(), ChannelError> {
            tokio::time::sleep(self.delay).await;
            self.received.lock().push((from.clone(), seal));
            Ok(())
        }

        async fn get_seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError> {
            Ok(self
                .received
                .lock()
                .iter()
                .filter(|(_, s)| hashes.contains(s.hash()))
                .map(|(_, s)| s.clone())
                .collect())
        }

        async fn get_blocks(&self, _heights: &[Height]) -> Result<Vec<Block>, ChannelError> {
            Ok(Vec::new())
        }

        async fn get_manifests(&self, _heights: &[Height]) -> Result<Vec<Manifest>, ChannelError> {
            Ok(Vec::new())
        }

        async fn node_info(&self) -> Result<NodeInfo, ChannelError> {
            Ok(NodeInfo {
                address: self.node.address.clone(),
                publickey: self.node.publickey(),
                network_id: fixtures::NETWORK_ID.to_vec(),
                state: StateKind::Consensus,
                last_manifest: None,
                suffrage: vec![self.node.address.clone()],
            })
        }
    }

    fn recorder(name: &str, delay: Duration) -> Arc<Recorder> {
        Arc::new(Recorder {
            node: TestNode::new(name),
            received: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn seal_of(node: &TestNode) -> Seal {
        fixtures::operation_seal(node, vec![fixtures::kv_operation(node, "a", b"1")]).into()
    }

    #[tokio::test]
    async fn test_seal_crosses_the_wire() {
        let network = LocalNetwork::new();
        let target = recorder("n1", Duration::ZERO);
        let weak: Weak<dyn ChannelHandler> = Arc::downgrade(&target) as _;
        network.register(target.node.address.clone(), weak);

        let sender = TestNode::new("n0");
        let ch = network.channel(
            sender.address.clone(),
            target.node.address.clone(),
            Duration::from_secs(1),
        );
        let seal = seal_of(&sender);
        ch.send_seal(seal.clone()).await.unwrap();

        let received = target.received.lock().clone();
        assert_eq!(received, vec![(sender.address.clone(), seal.clone())]);
        assert_eq!(ch.seals(&[seal.hash().clone()]).await.unwrap(), vec![seal]);
        assert_eq!(ch.node_info().await.unwrap().last_height(), Height::NIL);
    }

    #[tokio::test]
    async fn test_down_and_dropped_nodes_are_unreachable() {
        let network = LocalNetwork::new();
        let target = recorder("n1", Duration::ZERO);
        let address = target.node.address.clone();
        let weak: Weak<dyn ChannelHandler> = Arc::downgrade(&target) as _;
        network.register(address.clone(), weak);
        let ch = network.channel(TestNode::new("n0").address, address.clone(), Duration::from_secs(1));

        network.set_down(&address);
        assert!(matches!(ch.node_info().await, Err(ChannelError::Connection(_))));
        network.set_up(&address);
        assert!(ch.node_info().await.is_ok());

        drop(target);
        assert!(!network.is_reachable(&address));
        assert!(matches!(ch.node_info().await, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_slow_peer_times_out() {
        let network = LocalNetwork::new();
        let target = recorder("n1", Duration::from_millis(200));
        let weak: Weak<dyn ChannelHandler> = Arc::downgrade(&target) as _;
        network.register(target.node.address.clone(), weak);
        let sender = TestNode::new("n0");
        let ch = network.channel(
            sender.address.clone(),
            target.node.address.clone(),
            Duration::from_millis(20),
        );
        assert!(matches!(
            ch.send_seal(seal_of(&sender)).await,
            Err(ChannelError::Timeout)
        ));
    }
}
