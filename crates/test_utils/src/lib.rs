// Path: crates/test_utils/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # ISAAC Test Utilities
//!
//! Fixtures and assertions shared by the crate test suites. Fixtures panic
//! with a message instead of returning errors; they only run inside tests.

pub mod assertions;
pub mod fixtures;
