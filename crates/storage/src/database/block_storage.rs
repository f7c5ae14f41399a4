// Path: crates/storage/src/database/block_storage.rs
use super::tables::put_block;
use super::RedbDatabase;
use crate::metrics::metrics;
use async_trait::async_trait;
use isaac_api::storage::BlockStorage;
use isaac_types::app::{Block, BlockDataMap};
use isaac_types::error::StorageError;
use isaac_telemetry::time;

/// Buffers one block in memory and writes it in a single transaction.
#[derive(Debug)]
pub struct RedbBlockStorage {
    db: RedbDatabase,
    block: Block,
    map: Option<BlockDataMap>,
}

impl RedbBlockStorage {
    pub(crate) fn new(db: RedbDatabase, block: Block) -> Self {
        Self {
            db,
            block,
            map: None,
        }
    }
}

#[async_trait]
impl BlockStorage for RedbBlockStorage {
    fn block(&self) -> &Block {
        &self.block
    }

    async fn set_block(&mut self, block: Block) -> Result<(), StorageError> {
        if block.height() != self.block.height() {
            return Err(StorageError::Backend(format!(
                "block storage of height {} got block {}",
                self.block.height(),
                block.height()
            )));
        }
        self.block = block;
        Ok(())
    }

    async fn set_blockdata_map(&mut self, map: BlockDataMap) -> Result<(), StorageError> {
        self.map = Some(map);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let Self { db, block, map } = *self;
        let height = block.height();
        let hash = block.hash().clone();
        let operations = block.operations.len();
        {
            let _timer = time::block_commit(metrics());
            db.write(move |w| put_block(w, &block, map.as_ref())).await?;
        }
        metrics().inc_blocks_stored();
        tracing::info!(
            target: "storage",
            event = "block_stored",
            height = height.0,
            block = %hash,
            operations,
            "block stored"
        );
        Ok(())
    }

    async fn cancel(self: Box<Self>) -> Result<(), StorageError> {
        tracing::debug!(
            target: "storage",
            height = self.block.height().0,
            block = %self.block.hash(),
            "block storage cancelled"
        );
        Ok(())
    }
}
