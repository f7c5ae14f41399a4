// Path: crates/state/src/lib.rs
//! # ISAAC State Crate Lints
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
        clippy::indexing_slicing
    )
)]
//! # ISAAC State
//!
//! The AVL-hashable tree builder and the per-block state pool used by the
//! proposal processor.

pub mod pool;
pub mod tree;

/// A prelude for easily importing the most common types.
pub mod prelude {
    pub use crate::pool::{PoolError, StatePool, StateUpdater};
    pub use crate::tree::avl::AvlTreeBuilder;
}
