// Path: crates/networking/src/lib.rs
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

//! # ISAAC Networking
//!
//! The peer contract of the consensus core. A [`Channel`] reaches one remote
//! node; the [`Nodepool`] holds a channel per known node and broadcasts
//! seals. [`LocalNetwork`] connects nodes living in the same process.

pub mod channel;
pub mod local;
pub mod nodepool;

pub use channel::{Channel, ChannelHandler, NodeInfo};
pub use local::{LocalChannel, LocalNetwork};
pub use nodepool::Nodepool;
