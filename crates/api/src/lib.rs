// Path: crates/api/src/lib.rs

//! # ISAAC API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
//! # ISAAC API
//!
//! Core traits of the ISAAC consensus node. This crate defines the stable
//! contract between the consensus core and its storage and processing
//! components.

/// The block artifact store.
pub mod blockdata;
/// Suffrage, proposal processor and node state.
pub mod consensus;
/// Re-exports all core error types from the central `isaac-types` crate.
pub mod error;
/// Read access to committed state.
pub mod state;
/// The database contract.
pub mod storage;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::blockdata::{BlockData, BlockDataSession};
    pub use crate::consensus::{ActingSuffrage, ProposalProcessor, StateKind, Suffrage};
    pub use crate::error::{ErrorCode, ErrorKind, IsaacError, ProcessorError, StorageError};
    pub use crate::state::StateReader;
    pub use crate::storage::{BlockStorage, Database, SealOrder, SyncerStorage};
}
