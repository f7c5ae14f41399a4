// Path: crates/crypto/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]
//! # ISAAC Cryptography
//!
//! Content digests and the node key pairs used to sign seals, ballots and
//! operation facts.

pub mod algorithms;
pub mod encoding;
pub mod error;
pub mod sign;
