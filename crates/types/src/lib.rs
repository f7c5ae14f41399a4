// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # ISAAC Types
//!
//! The foundational library of the ISAAC node: identifiers, values and
//! states, operations, ballots and voteproofs, blocks, configuration and the
//! error taxonomy.
//!
//! ## Architectural Role
//!
//! Every other crate of the workspace depends on `isaac-types`; it depends
//! only on `isaac-crypto`. Keeping the canonical definitions here prevents
//! circular dependencies and keeps the hashing rules in one place.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::IsaacError> = std::result::Result<T, E>;

/// Core data structures: hashes, values, states, ballots and blocks.
pub mod app;
/// The canonical binary codec and the hinted envelope.
pub mod codec;
/// Node configuration and the consensus policy.
pub mod config;
/// A unified set of all error types used across the node.
pub mod error;
/// Type hints and the hint set.
pub mod hint;
