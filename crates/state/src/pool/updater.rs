// Path: crates/state/src/pool/updater.rs

//! The mutable view of one state cell during proposal processing.

use isaac_types::app::{Hash, Height, State, Value};
use isaac_types::error::StateError;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug)]
struct Inner {
    base: Option<State>,
    pending: State,
    op_cache: HashSet<Hash>,
    updated: bool,
}

/// Wraps a shared base state and a uniquely owned pending state.
#[derive(Debug)]
pub struct StateUpdater {
    key: String,
    inner: RwLock<Inner>,
}

impl StateUpdater {
    /// An updater over `base` for a block at `height`. `base` is `None`
    /// when the key has never been written.
    pub fn new(key: &str, base: Option<State>, height: Height) -> Result<Self, StateError> {
        let pending = match &base {
            Some(b) if b.key() != key => {
                return Err(StateError::KeyMismatch {
                    left: key.to_string(),
                    right: b.key().to_string(),
                })
            }
            Some(b) => b.set_height(height).clear_operations(),
            None => State::new(key, None, height)?,
        };
        Ok(Self {
            key: key.to_string(),
            inner: RwLock::new(Inner {
                base,
                pending,
                op_cache: HashSet::new(),
                updated: false,
            }),
        })
    }

    /// The state key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The committed state this updater started from.
    pub fn base(&self) -> Option<State> {
        self.inner.read().base.clone()
    }

    /// The pending state.
    pub fn state(&self) -> State {
        self.inner.read().pending.clone()
    }

    /// Whether anything was written since creation or the last reset.
    pub fn is_updated(&self) -> bool {
        self.inner.read().updated
    }

    /// Merges `incoming` into the pending state.
    pub fn merge(&self, incoming: &State) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let merged = inner.pending.merge(incoming)?;
        for op in incoming.operations() {
            inner.op_cache.insert(op.clone());
        }
        inner.pending = merged;
        inner.updated = true;
        Ok(())
    }

    /// Replaces the pending value.
    pub fn set_value(&self, value: Option<Value>) {
        let mut inner = self.inner.write();
        inner.pending = inner.pending.set_value(value);
        inner.updated = true;
    }

    /// Records that `fact` touched this cell. Repeated facts are ignored.
    pub fn add_operation(&self, fact: &Hash) {
        let mut inner = self.inner.write();
        if inner.op_cache.insert(fact.clone()) {
            inner.pending = inner.pending.add_operation(fact.clone());
            inner.updated = true;
        }
    }

    /// Moves the pending state to `height`, starting a fresh operation cache.
    pub fn set_height(&self, height: Height) {
        let mut inner = self.inner.write();
        inner.op_cache.clear();
        inner.pending = inner.pending.set_height(height).clear_operations();
    }

    /// Restores the pending state to the base value.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let height = inner.pending.height();
        inner.pending = match &inner.base {
            Some(b) => b.set_height(height).clear_operations(),
            None => inner.pending.set_value(None).clear_operations(),
        };
        inner.op_cache.clear();
        inner.updated = false;
    }

    pub(crate) fn snapshot(&self) -> (State, HashSet<Hash>, bool) {
        let inner = self.inner.read();
        (inner.pending.clone(), inner.op_cache.clone(), inner.updated)
    }

    pub(crate) fn restore(&self, snapshot: (State, HashSet<Hash>, bool)) {
        let mut inner = self.inner.write();
        inner.pending = snapshot.0;
        inner.op_cache = snapshot.1;
        inner.updated = snapshot.2;
    }

    /// The final state of the cell: linked to `previous_block` and hashed.
    pub fn finish(&self, previous_block: &Hash) -> Result<State, StateError> {
        let inner = self.inner.read();
        inner
            .pending
            .set_previous_block(previous_block.clone())
            .set_hash()
    }
}
