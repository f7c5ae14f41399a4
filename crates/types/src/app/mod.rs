// Path: crates/types/src/app/mod.rs
//! Core application-level data structures: identifiers, values, states,
//! operations, ballots, voteproofs and blocks.

/// Node addresses and state key validation.
pub mod address;
/// Signed stage messages.
pub mod ballot;
/// Manifests, blocks and block data maps.
pub mod block;
/// Content-addressed identifiers.
pub mod hash;
/// Height, round and stage.
pub mod height;
/// Operations and operation seals.
pub mod operation;
/// Seals received from the network.
pub mod seal;
/// State cells.
pub mod state;
/// Wall-clock timestamps and duration encoding.
pub mod timing;
/// The immutable AVL-hashable tree.
pub mod tree;
/// State values.
pub mod value;
/// Thresholds and voteproofs.
pub mod voteproof;

pub use address::*;
pub use ballot::*;
pub use block::*;
pub use hash::*;
pub use height::*;
pub use operation::*;
pub use seal::*;
pub use state::*;
pub use timing::Timestamp;
pub use tree::*;
pub use value::*;
pub use voteproof::*;
