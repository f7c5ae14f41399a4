// Path: crates/api/src/storage/mod.rs

//! The durable storage contract of the consensus core.
//!
//! A [`Database`] serves reads and staged seals; every block is written
//! through a [`BlockStorage`] handle that buffers all writes of one block
//! and commits them in a single transaction.

use crate::state::StateReader;
use async_trait::async_trait;
use isaac_types::app::{
    Ballot, Block, BlockDataMap, Hash, Height, Manifest, OperationSeal, Round, Seal, Stage,
    Voteproof,
};
use isaac_types::error::StorageError;

/// Order of staged operation seals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealOrder {
    /// Oldest first.
    Oldest,
    /// Newest first.
    Newest,
}

/// Buffers the writes of one block until `commit` or `cancel`.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// The buffered block.
    fn block(&self) -> &Block;

    /// Replaces the buffered block, e.g. with its confirmed manifest.
    async fn set_block(&mut self, block: Block) -> Result<(), StorageError>;

    /// Records where the block data files of this block live.
    async fn set_blockdata_map(&mut self, map: BlockDataMap) -> Result<(), StorageError>;

    /// Writes every buffered item in one transaction. After it returns,
    /// `last_manifest` reflects the block and every operation of it is
    /// visible through `has_operation`.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discards every buffered item.
    async fn cancel(self: Box<Self>) -> Result<(), StorageError>;
}

/// Storage used while catching up from peers.
#[async_trait]
pub trait SyncerStorage: Send + Sync {
    /// Stages verified manifests, keyed by height.
    async fn set_manifests(&mut self, manifests: Vec<Manifest>) -> Result<(), StorageError>;

    /// A staged manifest.
    fn manifest(&self, height: Height) -> Option<&Manifest>;

    /// The highest staged manifest.
    fn last_manifest(&self) -> Option<&Manifest>;

    /// Commits one block in one transaction. Blocks must arrive in height
    /// order and match their staged manifest.
    async fn set_block(&mut self, block: Block, map: BlockDataMap) -> Result<(), StorageError>;

    /// Drops every staged manifest.
    async fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// The database contract of the consensus core.
#[async_trait]
pub trait Database: StateReader + Send + Sync {
    /// The manifest of the highest stored block.
    async fn last_manifest(&self) -> Result<Option<Manifest>, StorageError>;

    /// The manifest at `height`.
    async fn manifest_by_height(&self, height: Height) -> Result<Option<Manifest>, StorageError>;

    /// The manifest with block hash `hash`.
    async fn manifest(&self, hash: &Hash) -> Result<Option<Manifest>, StorageError>;

    /// The block at `height`.
    async fn block_by_height(&self, height: Height) -> Result<Option<Block>, StorageError>;

    /// The block with hash `hash`.
    async fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;

    /// The block data map of the block at `height`.
    async fn blockdata_map(&self, height: Height) -> Result<Option<BlockDataMap>, StorageError>;

    /// Stores seals. Operation seals are stored as staged.
    async fn new_seals(&self, seals: &[Seal]) -> Result<(), StorageError>;

    /// A stored seal.
    async fn seal(&self, hash: &Hash) -> Result<Option<Seal>, StorageError>;

    /// Whether a seal is stored.
    async fn has_seal(&self, hash: &Hash) -> Result<bool, StorageError> {
        Ok(self.seal(hash).await?.is_some())
    }

    /// Stored seals among `hashes`, in the order of `hashes`.
    async fn seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, StorageError> {
        let mut out = Vec::with_capacity(hashes.len());
        for h in hashes {
            if let Some(seal) = self.seal(h).await? {
                out.push(seal);
            }
        }
        Ok(out)
    }

    /// Staged operation seals.
    async fn staged_operation_seals(
        &self,
        order: SealOrder,
    ) -> Result<Vec<OperationSeal>, StorageError>;

    /// Removes seals from the staged set. The seals stay readable.
    async fn unstage_operation_seals(&self, hashes: &[Hash]) -> Result<(), StorageError>;

    /// Stores a proposal ballot, indexed by `(height, round)`.
    async fn new_proposal(&self, proposal: &Ballot) -> Result<(), StorageError>;

    /// The proposal of `(height, round)`.
    async fn proposal(&self, height: Height, round: Round) -> Result<Option<Ballot>, StorageError>;

    /// The proposal with fact hash `fact`.
    async fn proposal_by_fact(&self, fact: &Hash) -> Result<Option<Ballot>, StorageError>;

    /// Whether an operation fact is part of a stored block.
    async fn has_operation(&self, fact: &Hash) -> Result<bool, StorageError>;

    /// Stores one state outside of a block.
    async fn new_state(&self, state: &isaac_types::app::State) -> Result<(), StorageError>;

    /// Upserts the INIT voteproof of its height.
    async fn new_init_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError>;

    /// Upserts the ACCEPT voteproof of its height.
    async fn new_accept_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError>;

    /// The stored voteproof of `(height, stage)`.
    async fn voteproof(
        &self,
        height: Height,
        stage: Stage,
    ) -> Result<Option<Voteproof>, StorageError>;

    /// The stored voteproof of `stage` with the highest height.
    async fn last_voteproof(&self, stage: Stage) -> Result<Option<Voteproof>, StorageError>;

    /// Opens a write buffer for `block`.
    async fn open_block_storage(&self, block: Block)
        -> Result<Box<dyn BlockStorage>, StorageError>;

    /// Opens the storage used while syncing.
    async fn syncer_storage(&self) -> Result<Box<dyn SyncerStorage>, StorageError>;

    /// Deletes everything.
    async fn clean(&self) -> Result<(), StorageError>;
}
