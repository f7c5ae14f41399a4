// Path: crates/storage/src/database/mod.rs
//! A redb implementation of [`Database`].
//!
//! Reads run inline. Writes run on the blocking pool, bounded by the
//! configured `exec_timeout`; every write is one redb transaction.

mod block_storage;
mod syncer;
pub(crate) mod tables;

pub use block_storage::RedbBlockStorage;
pub use syncer::RedbSyncerStorage;

use crate::database::tables::*;
use async_trait::async_trait;
use isaac_api::state::StateReader;
use isaac_api::storage::{BlockStorage, Database, SealOrder, SyncerStorage};
use isaac_types::app::{
    Ballot, Block, BlockDataMap, Hash, Height, Manifest, OperationSeal, Round, Seal, Stage,
    State, Voteproof,
};
use isaac_types::error::StorageError;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The node database over one redb file.
#[derive(Clone)]
pub struct RedbDatabase {
    db: Arc<redb::Database>,
    exec_timeout: Duration,
}

impl std::fmt::Debug for RedbDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatabase")
            .field("exec_timeout", &self.exec_timeout)
            .finish_non_exhaustive()
    }
}

impl RedbDatabase {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, exec_timeout: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Fs(e.to_string()))?;
        }
        let db = redb::Database::create(path).map_err(backend)?;
        let w = db.begin_write().map_err(backend)?;
        create_all(&w)?;
        w.commit().map_err(backend)?;
        tracing::debug!(target: "storage", path = %path.display(), "database opened");
        Ok(Self {
            db: Arc::new(db),
            exec_timeout,
        })
    }

    fn read_txn(&self) -> Result<ReadTransaction<'_>, StorageError> {
        self.db.begin_read().map_err(backend)
    }

    /// Runs `f` inside one write transaction on the blocking pool.
    pub(crate) async fn write<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&WriteTransaction<'_>) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            let w = db.begin_write().map_err(backend)?;
            match f(&w) {
                Ok(out) => {
                    w.commit().map_err(backend)?;
                    Ok(out)
                }
                Err(e) => {
                    w.abort().map_err(backend)?;
                    Err(e)
                }
            }
        });
        match tokio::time::timeout(self.exec_timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join)) => Err(StorageError::Backend(join.to_string())),
            Err(_) => Err(StorageError::Timeout),
        }
    }

    fn get_bytes<K>(
        &self,
        table: redb::TableDefinition<'static, K, &'static [u8]>,
        key: K::SelfType<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError>
    where
        K: redb::RedbKey + 'static,
    {
        let r = self.read_txn()?;
        let t = r.open_table(table).map_err(backend)?;
        let out = t.get(key).map_err(backend)?.map(|v| v.value().to_vec());
        Ok(out)
    }

    fn hash_at(&self, height: Height) -> Result<Option<Hash>, StorageError> {
        self.get_bytes(HEIGHTS, height.0)?
            .map(|b| Hash::from_bytes(b).map_err(|e| StorageError::Decode(e.to_string())))
            .transpose()
    }
}

#[async_trait]
impl StateReader for RedbDatabase {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        self.get_bytes(STATES, key)?
            .map(|b| decode(&b))
            .transpose()
    }
}

#[async_trait]
impl Database for RedbDatabase {
    async fn last_manifest(&self) -> Result<Option<Manifest>, StorageError> {
        let hash = {
            let r = self.read_txn()?;
            let t = r.open_table(HEIGHTS).map_err(backend)?;
            let mut iter = t.iter().map_err(backend)?;
            let last = match iter.next_back() {
                Some(entry) => entry.map_err(backend)?.1.value().to_vec(),
                None => return Ok(None),
            };
            last
        };
        self.get_bytes(MANIFESTS, hash.as_slice())?
            .map(|b| decode_manifest(&b))
            .transpose()
    }

    async fn manifest_by_height(&self, height: Height) -> Result<Option<Manifest>, StorageError> {
        match self.hash_at(height)? {
            Some(hash) => self.manifest(&hash).await,
            None => Ok(None),
        }
    }

    async fn manifest(&self, hash: &Hash) -> Result<Option<Manifest>, StorageError> {
        self.get_bytes(MANIFESTS, hash.as_bytes())?
            .map(|b| decode_manifest(&b))
            .transpose()
    }

    async fn block_by_height(&self, height: Height) -> Result<Option<Block>, StorageError> {
        match self.hash_at(height)? {
            Some(hash) => self.block(&hash).await,
            None => Ok(None),
        }
    }

    async fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        self.get_bytes(BLOCKS, hash.as_bytes())?
            .map(|b| decode(&b))
            .transpose()
    }

    async fn blockdata_map(&self, height: Height) -> Result<Option<BlockDataMap>, StorageError> {
        self.get_bytes(BLOCKDATA_MAPS, height.0)?
            .map(|b| decode(&b))
            .transpose()
    }

    async fn new_seals(&self, seals: &[Seal]) -> Result<(), StorageError> {
        if seals.is_empty() {
            return Ok(());
        }
        let seals = seals.to_vec();
        let stored = self.write(move |w| put_seals(w, &seals)).await?;
        tracing::trace!(target: "storage", stored, "seals stored");
        Ok(())
    }

    async fn seal(&self, hash: &Hash) -> Result<Option<Seal>, StorageError> {
        self.get_bytes(SEALS, hash.as_bytes())?
            .map(|b| decode(&b))
            .transpose()
    }

    async fn staged_operation_seals(
        &self,
        order: SealOrder,
    ) -> Result<Vec<OperationSeal>, StorageError> {
        let r = self.read_txn()?;
        let staged = r.open_table(STAGED).map_err(backend)?;
        let seals = r.open_table(SEALS).map_err(backend)?;
        let mut hashes = Vec::new();
        for entry in staged.iter().map_err(backend)? {
            let (_, v) = entry.map_err(backend)?;
            hashes.push(v.value().to_vec());
        }
        if order == SealOrder::Newest {
            hashes.reverse();
        }
        let mut out = Vec::with_capacity(hashes.len());
        for h in hashes {
            let Some(bytes) = seals
                .get(h.as_slice())
                .map_err(backend)?
                .map(|v| v.value().to_vec())
            else {
                continue;
            };
            if let Seal::Operation(seal) = decode::<Seal>(&bytes)? {
                out.push(seal);
            }
        }
        Ok(out)
    }

    async fn unstage_operation_seals(&self, hashes: &[Hash]) -> Result<(), StorageError> {
        let hashes = hashes.to_vec();
        self.write(move |w| unstage(w, &hashes)).await
    }

    async fn new_proposal(&self, proposal: &Ballot) -> Result<(), StorageError> {
        let proposal = proposal.clone();
        self.write(move |w| put_proposal(w, &proposal)).await
    }

    async fn proposal(&self, height: Height, round: Round) -> Result<Option<Ballot>, StorageError> {
        match self.get_bytes(PROPOSAL_INDEX, (height.0, round.0))? {
            Some(fact) => self
                .get_bytes(PROPOSALS, fact.as_slice())?
                .map(|b| decode(&b))
                .transpose(),
            None => Ok(None),
        }
    }

    async fn proposal_by_fact(&self, fact: &Hash) -> Result<Option<Ballot>, StorageError> {
        self.get_bytes(PROPOSALS, fact.as_bytes())?
            .map(|b| decode(&b))
            .transpose()
    }

    async fn has_operation(&self, fact: &Hash) -> Result<bool, StorageError> {
        let r = self.read_txn()?;
        let t = r.open_table(OPERATIONS).map_err(backend)?;
        let found = t.get(fact.as_bytes()).map_err(backend)?.is_some();
        Ok(found)
    }

    async fn new_state(&self, state: &State) -> Result<(), StorageError> {
        let state = state.clone();
        self.write(move |w| put_state(w, &state)).await
    }

    async fn new_init_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError> {
        if voteproof.stage() != Stage::Init {
            return Err(StorageError::Encode(format!(
                "expected INIT voteproof, got {}",
                voteproof.stage()
            )));
        }
        let vp = voteproof.clone();
        self.write(move |w| put_voteproof(w, &vp)).await?;
        Ok(())
    }

    async fn new_accept_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError> {
        if voteproof.stage() != Stage::Accept {
            return Err(StorageError::Encode(format!(
                "expected ACCEPT voteproof, got {}",
                voteproof.stage()
            )));
        }
        let vp = voteproof.clone();
        self.write(move |w| put_voteproof(w, &vp)).await?;
        Ok(())
    }

    async fn voteproof(
        &self,
        height: Height,
        stage: Stage,
    ) -> Result<Option<Voteproof>, StorageError> {
        self.get_bytes(VOTEPROOFS, (height.0, stage.as_byte()))?
            .map(|b| decode(&b))
            .transpose()
    }

    async fn last_voteproof(&self, stage: Stage) -> Result<Option<Voteproof>, StorageError> {
        let r = self.read_txn()?;
        let t = r.open_table(VOTEPROOFS).map_err(backend)?;
        for entry in t.iter().map_err(backend)?.rev() {
            let (k, v) = entry.map_err(backend)?;
            if k.value().1 == stage.as_byte() {
                return decode(v.value()).map(Some);
            }
        }
        Ok(None)
    }

    async fn open_block_storage(
        &self,
        block: Block,
    ) -> Result<Box<dyn BlockStorage>, StorageError> {
        Ok(Box::new(RedbBlockStorage::new(self.clone(), block)))
    }

    async fn syncer_storage(&self) -> Result<Box<dyn SyncerStorage>, StorageError> {
        Ok(Box::new(RedbSyncerStorage::new(self.clone())))
    }

    async fn clean(&self) -> Result<(), StorageError> {
        self.write(drop_all).await?;
        tracing::info!(target: "storage", event = "database_cleaned", "database cleaned");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
