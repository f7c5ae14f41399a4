// Path: crates/api/src/error/mod.rs
// Re-export all core error types from the central types crate.
pub use isaac_types::error::{
    BallotError, BlockError, ChannelError, CryptoError, ErrorCode, ErrorKind, HashError,
    HintError, IsaacError, ProcessorError, SealError, StateError, StorageError,
};
pub use isaac_types::Result;
