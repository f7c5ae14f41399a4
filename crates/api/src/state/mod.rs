// Path: crates/api/src/state/mod.rs
//! Read access to the committed world state.

use async_trait::async_trait;
use isaac_types::app::State;
use isaac_types::error::StorageError;
use std::sync::Arc;

/// Reads committed states by key.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// The committed state of `key`.
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError>;
}

#[async_trait]
impl<T: StateReader + ?Sized> StateReader for Arc<T> {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        (**self).state(key).await
    }
}

#[async_trait]
impl<T: StateReader + ?Sized> StateReader for &T {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        (**self).state(key).await
    }
}

#[cfg(test)]
mod tests;
