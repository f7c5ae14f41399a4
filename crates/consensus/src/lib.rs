// Path: crates/consensus/src/lib.rs
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
//! The ISAAC consensus core: ballot collection, suffrage selection, proposal
//! processing, syncing and the node state machine.

pub mod ballotbox;
pub mod checker;
pub mod local;
pub mod metrics;
pub mod node;
pub mod operation;
pub mod processor;
pub mod states;
pub mod suffrage;
pub mod syncer;

pub use ballotbox::Ballotbox;
pub use checker::BallotChecker;
pub use local::{LocalNode, LocalPolicy};
pub use node::Node;
pub use processor::{
    genesis_previous_block, DefaultProposalProcessor, ErrorProposalProcessor, GenesisGenerator,
};
pub use suffrage::{FixedProposer, Roundrobin};
pub use syncer::Syncer;
