// Path: crates/storage/src/lib.rs
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

//! Persistent storage for the ISAAC consensus core.
//!
//! [`RedbDatabase`] keeps manifests, blocks, seals, proposals, voteproofs and
//! the world state in one redb file and writes every block in one
//! transaction. [`LocalFsBlockData`] keeps the gzip-compressed artifacts of
//! every block on the local file system.

pub mod database;
pub mod localfs;
pub mod metrics;

pub use database::RedbDatabase;
pub use localfs::LocalFsBlockData;
