// Path: crates/consensus/src/syncer.rs
//! Catches the local chain up from peers.
//!
//! Manifests are fetched first, in batches, and their hash chain is checked
//! from the local head. Blocks follow in the same batches; each must match
//! its staged manifest and pass its own validation before its artifacts and
//! database records are written. A peer that fails is replaced by the next
//! one; storage failures end the run.

use crate::processor::genesis_previous_block;
use futures::future::join_all;
use isaac_api::blockdata::BlockData;
use isaac_api::storage::{Database, SyncerStorage};
use isaac_networking::{Channel, Nodepool};
use isaac_types::app::{Block, Hash, Height};
use isaac_types::error::{BlockError, ChannelError, ErrorKind, IsaacError};
use std::sync::Arc;

/// Heights requested per call.
pub const BATCH_SIZE: usize = 20;

pub struct Syncer {
    network_id: Vec<u8>,
    database: Arc<dyn Database>,
    blockdata: Arc<dyn BlockData>,
    nodepool: Arc<Nodepool>,
}

impl Syncer {
    pub fn new(
        network_id: impl Into<Vec<u8>>,
        database: Arc<dyn Database>,
        blockdata: Arc<dyn BlockData>,
        nodepool: Arc<Nodepool>,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            database,
            blockdata,
            nodepool,
        }
    }

    /// Peers of this network with their last height, highest first.
    async fn peers(&self) -> Vec<(Arc<dyn Channel>, Height)> {
        let channels = self.nodepool.channels();
        let infos = join_all(channels.into_iter().map(|ch| async move {
            let info = ch.node_info().await;
            (ch, info)
        }))
        .await;
        let mut peers: Vec<_> = infos
            .into_iter()
            .filter_map(|(ch, info)| match info {
                Ok(info) if info.network_id == self.network_id => Some((ch, info.last_height())),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(target: "syncer", peer = %ch.address(), error = %e, "node info unavailable");
                    None
                }
            })
            .collect();
        peers.sort_by(|a, b| b.1.cmp(&a.1));
        peers
    }

    /// The highest height known to any peer, or `NIL`.
    pub async fn best_height(&self) -> Height {
        self.peers()
            .await
            .first()
            .map(|(_, h)| *h)
            .unwrap_or(Height::NIL)
    }

    /// Syncs up to `target` from the first peer that gets there. Returns the
    /// new local head height.
    pub async fn sync(&self, target: Height) -> Result<Height, IsaacError> {
        let peers = self.peers().await;
        let head = self.head_height().await?;
        if head >= target {
            return Ok(head);
        }

        let mut last = None;
        for (peer, height) in peers.iter().filter(|(_, h)| *h >= target) {
            match self.sync_from(peer.as_ref(), target).await {
                Ok(h) => return Ok(h),
                Err(e) if e.kind() == ErrorKind::Fatal => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        target: "syncer",
                        peer = %peer.address(),
                        peer_height = height.0,
                        error = %e,
                        "sync from peer failed"
                    );
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            ChannelError::NotFound(format!("no peer reached height {target}")).into()
        }))
    }

    async fn head_height(&self) -> Result<Height, IsaacError> {
        Ok(self
            .database
            .last_manifest()
            .await?
            .map(|m| m.height())
            .unwrap_or(Height::NIL))
    }

    async fn sync_from(&self, peer: &dyn Channel, target: Height) -> Result<Height, IsaacError> {
        let (from, previous) = match self.database.last_manifest().await? {
            Some(m) => (m.height().next(), m.hash().clone()),
            None => (Height::GENESIS, genesis_previous_block(&self.network_id)),
        };
        if from > target {
            return Ok(from.prev());
        }
        tracing::info!(
            target: "syncer",
            peer = %peer.address(),
            from = from.0,
            to = target.0,
            "syncing"
        );

        let mut storage = self.database.syncer_storage().await?;
        let result = self
            .fetch(peer, storage.as_mut(), from, previous, target)
            .await;
        if let Err(e) = storage.close().await {
            tracing::warn!(target: "syncer", error = %e, "syncer storage not closed");
        }
        result?;

        tracing::info!(
            target: "syncer",
            event = "synced",
            peer = %peer.address(),
            height = target.0,
            "synced"
        );
        Ok(target)
    }

    async fn fetch(
        &self,
        peer: &dyn Channel,
        storage: &mut dyn SyncerStorage,
        from: Height,
        mut previous: Hash,
        target: Height,
    ) -> Result<(), IsaacError> {
        let heights: Vec<Height> = (from.0..=target.0).map(Height).collect();

        for chunk in heights.chunks(BATCH_SIZE) {
            let manifests = peer.manifests(chunk).await?;
            if manifests.len() != chunk.len() {
                return Err(ChannelError::InvalidResponse(format!(
                    "{} manifests for {} heights",
                    manifests.len(),
                    chunk.len()
                ))
                .into());
            }
            for (height, manifest) in chunk.iter().zip(&manifests) {
                if manifest.height() != *height {
                    return Err(BlockError::InvalidHeight {
                        expected: *height,
                        got: manifest.height(),
                    }
                    .into());
                }
                manifest.is_valid()?;
                if *manifest.previous_block() != previous {
                    return Err(BlockError::PreviousBlockMismatch {
                        height: *height,
                        expected: previous,
                        got: manifest.previous_block().clone(),
                    }
                    .into());
                }
                previous = manifest.hash().clone();
            }
            storage.set_manifests(manifests).await?;
        }

        for chunk in heights.chunks(BATCH_SIZE) {
            let blocks = peer.blocks(chunk).await?;
            if blocks.len() != chunk.len() {
                return Err(ChannelError::InvalidResponse(format!(
                    "{} blocks for {} heights",
                    blocks.len(),
                    chunk.len()
                ))
                .into());
            }
            for (height, block) in chunk.iter().zip(blocks) {
                let staged = storage
                    .manifest(*height)
                    .map(|m| m.hash().clone())
                    .ok_or_else(|| IsaacError::Invariant(format!("manifest {height} not staged")))?;
                if *block.hash() != staged {
                    return Err(BlockError::BlockHashMismatch {
                        expected: staged,
                        got: block.hash().clone(),
                    }
                    .into());
                }
                block.is_valid(&self.network_id)?;
                self.save(storage, block).await?;
            }
        }
        Ok(())
    }

    async fn save(&self, storage: &mut dyn SyncerStorage, block: Block) -> Result<(), IsaacError> {
        let height = block.height();
        let mut session = self.blockdata.new_session(height, block.hash()).await?;
        if let Err(e) = session.save_block(&block).await {
            if let Err(ce) = session.cancel().await {
                tracing::warn!(target: "syncer", height = height.0, error = %ce, "block data session not cancelled");
            }
            return Err(e.into());
        }
        let map = session.done().await?;
        if let Err(e) = storage.set_block(block, map).await {
            if let Err(re) = self.blockdata.remove(height).await {
                tracing::warn!(target: "syncer", height = height.0, error = %re, "block data not removed");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use isaac_api::consensus::StateKind;
    use isaac_networking::{ChannelHandler, LocalNetwork, NodeInfo};
    use isaac_storage::{LocalFsBlockData, RedbDatabase};
    use isaac_test_utils::fixtures::{self, TestNode};
    use isaac_types::app::{Manifest, Seal};
    use std::sync::Weak;
    use std::time::Duration;

    /// Serves manifests from one chain and blocks from another.
    struct Peer {
        node: TestNode,
        manifests: Vec<Block>,
        blocks: Vec<Block>,
    }

    impl Peer {
        fn honest(node: TestNode, chain: Vec<Block>) -> Arc<Self> {
            Arc::new(Self {
                node,
                manifests: chain.clone(),
                blocks: chain,
            })
        }

        fn pick(chain: &[Block], heights: &[Height]) -> Vec<Block> {
            heights
                .iter()
                .filter_map(|h| chain.iter().find(|b| b.height() == *h).cloned())
                .collect()
        }
    }

    #[async_trait]
    impl ChannelHandler for Peer {
        async fn handle_seal(&self, _from: &isaac_types::app::Address, _seal: Seal) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn get_seals(&self, _hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError> {
            Ok(Vec::new())
        }
        async fn get_blocks(&self, heights: &[Height]) -> Result<Vec<Block>, ChannelError> {
            Ok(Self::pick(&self.blocks, heights))
        }
        async fn get_manifests(&self, heights: &[Height]) -> Result<Vec<Manifest>, ChannelError> {
            Ok(Self::pick(&self.manifests, heights)
                .into_iter()
                .map(|b| b.manifest)
                .collect())
        }
        async fn node_info(&self) -> Result<NodeInfo, ChannelError> {
            Ok(NodeInfo {
                address: self.node.address.clone(),
                publickey: self.node.publickey(),
                network_id: fixtures::NETWORK_ID.to_vec(),
                state: StateKind::Consensus,
                last_manifest: self.manifests.last().map(|b| b.manifest.clone()),
                suffrage: vec![self.node.address.clone()],
            })
        }
    }

    struct Env {
        _dir: tempfile::TempDir,
        network: LocalNetwork,
        db: Arc<RedbDatabase>,
        blockdata: Arc<LocalFsBlockData>,
        syncer: Syncer,
        pool: Arc<Nodepool>,
    }

    fn env() -> Env {
        let dir = fixtures::tempdir();
        let local = TestNode::new("local");
        let db = Arc::new(RedbDatabase::open(dir.path().join("db"), Duration::from_secs(2)).unwrap());
        let blockdata =
            Arc::new(LocalFsBlockData::open(dir.path().join("bd"), Duration::from_secs(60)).unwrap());
        let pool = Arc::new(Nodepool::new(local.address.clone(), local.publickey()));
        let syncer = Syncer::new(fixtures::NETWORK_ID, db.clone(), blockdata.clone(), pool.clone());
        Env {
            _dir: dir,
            network: LocalNetwork::new(),
            db,
            blockdata,
            syncer,
            pool,
        }
    }

    impl Env {
        fn connect(&self, peer: &Arc<Peer>) {
            let weak: Weak<dyn ChannelHandler> = Arc::downgrade(peer) as _;
            self.network.register(peer.node.address.clone(), weak);
            let ch = self.network.channel(
                self.pool.local().clone(),
                peer.node.address.clone(),
                Duration::from_secs(2),
            );
            self.pool
                .add(peer.node.address.clone(), peer.node.publickey(), Some(Arc::new(ch)));
        }
    }

    #[tokio::test]
    async fn test_sync_across_batches() {
        let env = env();
        let voters = TestNode::many(1);
        let chain = fixtures::chain(&voters, BATCH_SIZE + 5);
        let peer = Peer::honest(TestNode::new("p0"), chain.clone());
        env.connect(&peer);

        let best = env.syncer.best_height().await;
        assert_eq!(best, Height(24));
        assert_eq!(env.syncer.sync(best).await.unwrap(), Height(24));
        let last = env.db.last_manifest().await.unwrap().unwrap();
        assert_eq!(last.hash(), chain[24].hash());
        for b in &chain {
            assert!(env.blockdata.exists(b.height()).await.unwrap());
            assert!(env.db.blockdata_map(b.height()).await.unwrap().is_some());
        }

        // already there
        assert_eq!(env.syncer.sync(Height(3)).await.unwrap(), Height(24));
    }

    #[tokio::test]
    async fn test_bad_peer_is_skipped() {
        let env = env();
        let voters = TestNode::many(1);
        let chain = fixtures::chain(&voters, 6);
        let fork = fixtures::chain(&voters, 6);

        // manifests of one chain, blocks of another; also the highest peer
        let liar = Arc::new(Peer {
            node: TestNode::new("p0"),
            manifests: chain.clone(),
            blocks: fork,
        });
        let honest = Peer::honest(TestNode::new("p1"), chain[..5].to_vec());
        env.connect(&liar);
        env.connect(&honest);

        assert_eq!(env.syncer.sync(Height(4)).await.unwrap(), Height(4));
        let last = env.db.last_manifest().await.unwrap().unwrap();
        assert_eq!(last.hash(), chain[4].hash());
    }

    #[tokio::test]
    async fn test_no_peer_is_transient() {
        let env = env();
        let err = env.syncer.sync(Height(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(env.db.last_manifest().await.unwrap().is_none());
    }
}
