// Path: crates/state/src/pool/mod.rs

//! The transactional view over the world state used while processing
//! exactly one proposal.
//!
//! Lock order is always the pool index first, then a single updater. Reads
//! from the committed store happen before the index lock is taken, so no
//! lock is held across an await point.

mod updater;

pub use updater::StateUpdater;

use isaac_api::state::StateReader;
use isaac_types::app::{Hash, Height, Operation, State};
use isaac_types::error::{StateError, StorageError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by [`StatePool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// Reading the committed store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A merge was rejected.
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Default)]
struct Index {
    updaters: BTreeMap<String, Arc<StateUpdater>>,
    inserted: Vec<Hash>,
    inserted_set: HashSet<Hash>,
    added: Vec<Operation>,
}

/// Per-block state view.
pub struct StatePool<R: StateReader> {
    reader: R,
    height: Height,
    index: Mutex<Index>,
}

impl<R: StateReader> StatePool<R> {
    /// A pool for the block at `height` over the committed state of `reader`.
    pub fn new(reader: R, height: Height) -> Self {
        Self {
            reader,
            height,
            index: Mutex::new(Index::default()),
        }
    }

    /// Height of the block being built.
    pub fn height(&self) -> Height {
        self.height
    }

    fn updater(&self, key: &str) -> Option<Arc<StateUpdater>> {
        self.index.lock().updaters.get(key).cloned()
    }

    /// The current state of `key`: pending, else committed, else empty.
    ///
    /// The returned state is at the pool height.
    pub async fn get(&self, key: &str) -> Result<State, PoolError> {
        if let Some(u) = self.updater(key) {
            return Ok(u.state());
        }
        match self.reader.state(key).await? {
            Some(base) => Ok(base.set_height(self.height).clear_operations()),
            None => Ok(State::new(key, None, self.height)?),
        }
    }

    /// Merges `states` in on behalf of `fact`.
    ///
    /// All-or-nothing: when one merge fails, every updater touched by this
    /// call is restored.
    pub async fn set(&self, fact: &Hash, states: Vec<State>) -> Result<(), PoolError> {
        let mut bases = BTreeMap::new();
        for st in &states {
            if self.updater(st.key()).is_none() && !bases.contains_key(st.key()) {
                let base = self.reader.state(st.key()).await?;
                bases.insert(st.key().to_string(), base);
            }
        }

        let mut index = self.index.lock();
        let mut touched: Vec<(Arc<StateUpdater>, _)> = Vec::with_capacity(states.len());
        let mut created: Vec<String> = Vec::new();
        let mut failure = None;
        for st in &states {
            let updater = match index.updaters.get(st.key()) {
                Some(u) => u.clone(),
                None => {
                    let base = bases.remove(st.key()).flatten();
                    match StateUpdater::new(st.key(), base, self.height) {
                        Ok(u) => {
                            let u = Arc::new(u);
                            index.updaters.insert(st.key().to_string(), u.clone());
                            created.push(st.key().to_string());
                            u
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            };
            if !touched.iter().any(|(u, _)| Arc::ptr_eq(u, &updater)) {
                let snapshot = updater.snapshot();
                touched.push((updater.clone(), snapshot));
            }
            if let Err(e) = updater.merge(st) {
                failure = Some(e);
                break;
            }
            updater.add_operation(fact);
        }

        if let Some(e) = failure {
            for (u, snapshot) in touched {
                u.restore(snapshot);
            }
            for key in created {
                index.updaters.remove(&key);
            }
            return Err(e.into());
        }
        if index.inserted_set.insert(fact.clone()) {
            index.inserted.push(fact.clone());
        }
        Ok(())
    }

    /// Records operations submitted during processing.
    pub fn add_operations(&self, ops: &[Operation]) {
        self.index.lock().added.extend_from_slice(ops);
    }

    /// Updated cells, sorted by key.
    pub fn updates(&self) -> Vec<Arc<StateUpdater>> {
        self.index
            .lock()
            .updaters
            .values()
            .filter(|u| u.is_updated())
            .cloned()
            .collect()
    }

    /// Facts that touched state, in first-touch order.
    pub fn inserted_operations(&self) -> Vec<Hash> {
        self.index.lock().inserted.clone()
    }

    /// Every raw operation submitted during processing.
    pub fn added_operations(&self) -> Vec<Operation> {
        self.index.lock().added.clone()
    }

    /// Releases every updater.
    pub fn done(&self) {
        let mut index = self.index.lock();
        *index = Index::default();
    }
}

#[cfg(test)]
mod tests;
