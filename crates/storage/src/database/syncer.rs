// Path: crates/storage/src/database/syncer.rs
use super::tables::put_block;
use super::RedbDatabase;
use crate::metrics::metrics;
use async_trait::async_trait;
use isaac_api::storage::SyncerStorage;
use isaac_types::app::{Block, BlockDataMap, Height, Manifest};
use isaac_types::error::StorageError;
use std::collections::BTreeMap;

/// Stages fetched manifests and commits fetched blocks one by one.
#[derive(Debug)]
pub struct RedbSyncerStorage {
    db: RedbDatabase,
    manifests: BTreeMap<Height, Manifest>,
}

impl RedbSyncerStorage {
    pub(crate) fn new(db: RedbDatabase) -> Self {
        Self {
            db,
            manifests: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl SyncerStorage for RedbSyncerStorage {
    async fn set_manifests(&mut self, manifests: Vec<Manifest>) -> Result<(), StorageError> {
        for m in manifests {
            self.manifests.insert(m.height(), m);
        }
        Ok(())
    }

    fn manifest(&self, height: Height) -> Option<&Manifest> {
        self.manifests.get(&height)
    }

    fn last_manifest(&self) -> Option<&Manifest> {
        self.manifests.values().next_back()
    }

    async fn set_block(&mut self, block: Block, map: BlockDataMap) -> Result<(), StorageError> {
        let height = block.height();
        if let Some(staged) = self.manifests.get(&height) {
            if staged.hash() != block.hash() {
                return Err(StorageError::Backend(format!(
                    "block {height} does not match its staged manifest"
                )));
            }
        }
        let hash = block.hash().clone();
        self.db
            .write(move |w| put_block(w, &block, Some(&map)))
            .await?;
        metrics().inc_blocks_stored();
        tracing::info!(
            target: "syncer",
            event = "block_stored",
            height = height.0,
            block = %hash,
            "synced block stored"
        );
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StorageError> {
        tracing::debug!(target: "syncer", staged = self.manifests.len(), "syncer storage closed");
        Ok(())
    }
}
