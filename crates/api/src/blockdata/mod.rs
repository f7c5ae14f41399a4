// Path: crates/api/src/blockdata/mod.rs

//! The contract of the block artifact store.
//!
//! Artifacts are addressed by `(height, block hash)`. A session writes every
//! artifact of one block into an unstaged area and moves it into place in
//! one rename when it is done.

use async_trait::async_trait;
use isaac_types::app::{Block, BlockDataMap, BlockDataType, Hash, Height};
use isaac_types::error::StorageError;

/// Writes the artifacts of one block.
#[async_trait]
pub trait BlockDataSession: Send + Sync {
    /// Height of the block being written.
    fn height(&self) -> Height;

    /// Writes every artifact of `block` into the unstaged area.
    async fn save_block(&mut self, block: &Block) -> Result<(), StorageError>;

    /// Moves the unstaged artifacts into place and returns their map.
    async fn done(self: Box<Self>) -> Result<BlockDataMap, StorageError>;

    /// Drops the unstaged artifacts.
    async fn cancel(self: Box<Self>) -> Result<(), StorageError>;
}

/// Stores block artifacts.
#[async_trait]
pub trait BlockData: Send + Sync {
    /// Opens a write session for `(height, block)`.
    async fn new_session(
        &self,
        height: Height,
        block: &Hash,
    ) -> Result<Box<dyn BlockDataSession>, StorageError>;

    /// Whether artifacts of `height` exist and are not marked removed.
    async fn exists(&self, height: Height) -> Result<bool, StorageError>;

    /// Marks the artifacts of `height` as removed. Returns false when absent.
    async fn remove(&self, height: Height) -> Result<bool, StorageError>;

    /// Deletes the artifacts of `height`. Returns false when absent.
    async fn remove_all(&self, height: Height) -> Result<bool, StorageError>;

    /// Marks every height above `height` as removed and returns them.
    async fn remove_above(&self, height: Height) -> Result<Vec<Height>, StorageError>;

    /// Reads one artifact, checking its checksum.
    async fn read_item(
        &self,
        map: &BlockDataMap,
        item: BlockDataType,
    ) -> Result<Vec<u8>, StorageError>;

    /// Reassembles a block from its artifacts.
    async fn load_block(&self, map: &BlockDataMap) -> Result<Block, StorageError>;

    /// Deletes every artifact.
    async fn clean(&self) -> Result<(), StorageError>;
}
