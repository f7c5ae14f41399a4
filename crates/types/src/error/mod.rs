// Path: crates/types/src/error/mod.rs
//! Core error types for the ISAAC node.
//!
//! Every error exposes a stable machine-readable code through [`ErrorCode`]
//! and the top-level [`IsaacError`] classifies failures into the
//! [`ErrorKind`] taxonomy that the consensus state handlers use to pick a
//! transition.

use crate::app::{Address, Hash, Height, Round, Stage};
use thiserror::Error;

pub use isaac_crypto::error::CryptoError;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// How a failure affects the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The offending input is dropped; no state change.
    Validation,
    /// The message could not be decoded; dropped and logged at warn.
    Decoding,
    /// Locally recoverable; the node syncs or moves to the next round.
    Consensus,
    /// Retried a bounded number of times, then the node syncs.
    Transient,
    /// The node stops voting and enters BROKEN.
    Fatal,
}

impl ErrorKind {
    /// The lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Decoding => "decoding",
            Self::Consensus => "consensus",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidHashLength { .. } => "CRYPTO_INVALID_HASH_LENGTH",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::SigningFailed(_) => "CRYPTO_SIGNING_FAILED",
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
        }
    }
}

/// Errors raised when building or parsing a [`Hash`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The hash has no bytes.
    #[error("empty hash")]
    Empty,
    /// The hash is neither a SHA-256 nor a SHA-512 digest.
    #[error("invalid hash length {0}")]
    InvalidLength(usize),
    /// The base58 text form could not be decoded.
    #[error("invalid hash text: {0}")]
    Decode(String),
}

impl ErrorCode for HashError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "HASH_EMPTY",
            Self::InvalidLength(_) => "HASH_INVALID_LENGTH",
            Self::Decode(_) => "HASH_DECODE_FAILED",
        }
    }
}

/// Errors from the hinted polymorphic codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HintError {
    /// The blob's hint type is not registered.
    #[error("unknown type {0}")]
    UnknownType(String),
    /// The blob's major version differs from the registered one.
    #[error("version incompatible: expected {expected}, got {got}")]
    VersionIncompatible {
        /// The registered hint.
        expected: String,
        /// The hint found in the blob.
        got: String,
    },
    /// The hint header could not be parsed.
    #[error("invalid hint: {0}")]
    InvalidHint(String),
    /// The body could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
    /// The body could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for HintError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "HINT_UNKNOWN_TYPE",
            Self::VersionIncompatible { .. } => "HINT_VERSION_INCOMPATIBLE",
            Self::InvalidHint(_) => "HINT_INVALID",
            Self::Encode(_) => "HINT_ENCODE_FAILED",
            Self::Decode(_) => "HINT_DECODE_FAILED",
        }
    }
}

/// Errors related to values and state cells.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The state key is empty or contains whitespace.
    #[error("invalid state key {0:?}")]
    InvalidKey(String),
    /// A merge was attempted between states of different keys.
    #[error("state key mismatch: {left:?} != {right:?}")]
    KeyMismatch {
        /// The key of the receiving state.
        left: String,
        /// The key of the merged state.
        right: String,
    },
    /// A merge would move the state to a lower height.
    #[error("state height regression for {key:?}: {current} -> {incoming}")]
    HeightRegression {
        /// The state key.
        key: String,
        /// Height of the receiving state.
        current: Height,
        /// Height of the merged state.
        incoming: Height,
    },
    /// The state hash was already set and cannot change.
    #[error("state hash already set for {0:?}")]
    HashAlreadySet(String),
    /// The value is malformed or its hash does not match.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// A state or value failed validation.
    #[error("state validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "STATE_INVALID_KEY",
            Self::KeyMismatch { .. } => "STATE_KEY_MISMATCH",
            Self::HeightRegression { .. } => "STATE_HEIGHT_REGRESSION",
            Self::HashAlreadySet(_) => "STATE_HASH_ALREADY_SET",
            Self::InvalidValue(_) => "STATE_INVALID_VALUE",
            Self::Validation(_) => "STATE_VALIDATION_FAILED",
        }
    }
}

/// Errors related to operations and operation seals.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SealError {
    /// An operation seal without operations.
    #[error("operation seal has no operations")]
    EmptyOperations,
    /// An operation seal carrying more operations than allowed.
    #[error("operation seal has too many operations: {got} > {max}")]
    TooManyOperations {
        /// Number of operations in the seal.
        got: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// A signature did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// A hash did not match the content it covers.
    #[error("hash mismatch in {0}")]
    HashMismatch(&'static str),
    /// Generic validation failure.
    #[error("invalid seal: {0}")]
    Invalid(String),
}

impl ErrorCode for SealError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyOperations => "SEAL_EMPTY_OPERATIONS",
            Self::TooManyOperations { .. } => "SEAL_TOO_MANY_OPERATIONS",
            Self::InvalidSignature(_) => "SEAL_INVALID_SIGNATURE",
            Self::HashMismatch(_) => "SEAL_HASH_MISMATCH",
            Self::Invalid(_) => "SEAL_INVALID",
        }
    }
}

/// Errors raised while checking or voting a ballot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BallotError {
    /// The ballot is malformed.
    #[error("invalid ballot: {0}")]
    InvalidBallot(String),
    /// The ballot signature did not verify.
    #[error("invalid ballot signature from {0}")]
    InvalidSignature(Address),
    /// The voting node is not part of the (acting) suffrage.
    #[error("node {node} is not in the acting suffrage of {height}/{round}")]
    NotInSuffrage {
        /// The voting node.
        node: Address,
        /// Ballot height.
        height: Height,
        /// Ballot round.
        round: Round,
    },
    /// The node voted two different facts for the same (height, round, stage).
    #[error("equivocation by {node} at {height}/{round}/{stage}")]
    Equivocation {
        /// The equivocating node.
        node: Address,
        /// Ballot height.
        height: Height,
        /// Ballot round.
        round: Round,
        /// Ballot stage.
        stage: Stage,
    },
    /// The ballot is for a height the node already passed.
    #[error("stale ballot at {height}, local head {head}")]
    Stale {
        /// Ballot height.
        height: Height,
        /// Local head height.
        head: Height,
    },
    /// The ballot was signed too long ago.
    #[error("ballot signed outside of the valid timespan")]
    Expired,
}

impl ErrorCode for BallotError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidBallot(_) => "BALLOT_INVALID",
            Self::InvalidSignature(_) => "BALLOT_INVALID_SIGNATURE",
            Self::NotInSuffrage { .. } => "BALLOT_NOT_IN_SUFFRAGE",
            Self::Equivocation { .. } => "BALLOT_EQUIVOCATION",
            Self::Stale { .. } => "BALLOT_STALE",
            Self::Expired => "BALLOT_EXPIRED",
        }
    }
}

/// Errors related to block verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// The ACCEPT voteproof agreed on a different block than the local one.
    #[error("block hash mismatch: expected {expected}, got {got}")]
    BlockHashMismatch {
        /// Locally built block hash.
        expected: Hash,
        /// Block hash the network agreed on.
        got: Hash,
    },
    /// The block's `previous_block` does not match the preceding block.
    #[error("previous block mismatch at {height}: expected {expected}, got {got}")]
    PreviousBlockMismatch {
        /// The block height.
        height: Height,
        /// Hash of the preceding block.
        expected: Hash,
        /// The block's `previous_block`.
        got: Hash,
    },
    /// The block height is not the expected one.
    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight {
        /// The expected block height.
        expected: Height,
        /// The height of the received block.
        got: Height,
    },
    /// A generic, unspecified block validation error.
    #[error("invalid block: {0}")]
    Invalid(String),
}

impl ErrorCode for BlockError {
    fn code(&self) -> &'static str {
        match self {
            Self::BlockHashMismatch { .. } => "BLOCK_HASH_MISMATCH",
            Self::PreviousBlockMismatch { .. } => "BLOCK_PREVIOUS_MISMATCH",
            Self::InvalidHeight { .. } => "BLOCK_INVALID_HEIGHT",
            Self::Invalid(_) => "BLOCK_INVALID",
        }
    }
}

/// Represents errors that can occur within the durable storage layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A generic error originating from the underlying key-value store backend (e.g., redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found: {0}")]
    NotFound(String),
    /// A write would break a uniqueness invariant.
    #[error("duplicated: {0}")]
    Duplicated(String),
    /// A file system operation failed.
    #[error("fs error: {0}")]
    Fs(String),
    /// A stored item failed its checksum.
    #[error("checksum mismatch for {0}")]
    Checksum(String),
    /// The storage operation did not finish in time.
    #[error("storage timeout")]
    Timeout,
    /// The block storage was already committed or cancelled.
    #[error("block storage closed")]
    Closed,
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORAGE_BACKEND",
            Self::Encode(_) => "STORAGE_ENCODE",
            Self::Decode(_) => "STORAGE_DECODE",
            Self::NotFound(_) => "STORAGE_NOT_FOUND",
            Self::Duplicated(_) => "STORAGE_DUPLICATED",
            Self::Fs(_) => "STORAGE_FS",
            Self::Checksum(_) => "STORAGE_CHECKSUM",
            Self::Timeout => "STORAGE_TIMEOUT",
            Self::Closed => "STORAGE_CLOSED",
        }
    }
}

impl StorageError {
    /// Whether the error only reports a missing item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors returned by peer channels.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer did not answer in time.
    #[error("channel timeout")]
    Timeout,
    /// The peer could not be reached.
    #[error("connection error: {0}")]
    Connection(String),
    /// The peer does not have the requested item.
    #[error("not found: {0}")]
    NotFound(String),
    /// The peer answered with something unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ErrorCode for ChannelError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "CHANNEL_TIMEOUT",
            Self::Connection(_) => "CHANNEL_CONNECTION",
            Self::NotFound(_) => "CHANNEL_NOT_FOUND",
            Self::InvalidResponse(_) => "CHANNEL_INVALID_RESPONSE",
        }
    }
}

/// Errors raised while processing a proposal into a block.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The proposal could not be found locally or from peers.
    #[error("proposal not found: {0}")]
    ProposalNotFound(Hash),
    /// The proposal does not match the INIT voteproof it is processed with.
    #[error("wrong voteproof: {0}")]
    WrongVoteproof(String),
    /// ACCEPT arrived for a proposal that was never processed.
    #[error("proposal {0} was not processed")]
    NotProcessed(Hash),
    /// An operation referenced by the proposal could not be retrieved.
    #[error("operation seal not found: {0}")]
    SealNotFound(Hash),
    /// The built block does not match the agreed one.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// A storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A peer channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// A state failure.
    #[error(transparent)]
    State(#[from] StateError),
    /// Processing was cancelled.
    #[error("processing cancelled")]
    Cancelled,
    /// Processing did not finish in time.
    #[error("processing timed out")]
    Timeout,
    /// An injected failure.
    #[error("designed error at {height}/{round}: {point}")]
    Injected {
        /// Proposal height.
        height: Height,
        /// Proposal round.
        round: Round,
        /// Whether it was raised on prepare or save.
        point: &'static str,
    },
}

impl ErrorCode for ProcessorError {
    fn code(&self) -> &'static str {
        match self {
            Self::ProposalNotFound(_) => "PROCESSOR_PROPOSAL_NOT_FOUND",
            Self::WrongVoteproof(_) => "PROCESSOR_WRONG_VOTEPROOF",
            Self::NotProcessed(_) => "PROCESSOR_NOT_PROCESSED",
            Self::SealNotFound(_) => "PROCESSOR_SEAL_NOT_FOUND",
            Self::Block(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Channel(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Cancelled => "PROCESSOR_CANCELLED",
            Self::Timeout => "PROCESSOR_TIMEOUT",
            Self::Injected { .. } => "PROCESSOR_INJECTED",
        }
    }
}

/// The top-level error every consensus component reports to the state machine.
#[derive(Debug, Error)]
pub enum IsaacError {
    /// See [`HashError`].
    #[error(transparent)]
    Hash(#[from] HashError),
    /// See [`HintError`].
    #[error(transparent)]
    Hint(#[from] HintError),
    /// See [`StateError`].
    #[error(transparent)]
    State(#[from] StateError),
    /// See [`SealError`].
    #[error(transparent)]
    Seal(#[from] SealError),
    /// See [`BallotError`].
    #[error(transparent)]
    Ballot(#[from] BallotError),
    /// See [`BlockError`].
    #[error(transparent)]
    Block(#[from] BlockError),
    /// See [`StorageError`].
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// See [`ChannelError`].
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// See [`ProcessorError`].
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// See [`CryptoError`].
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// A voteproof failed validation or does not fit the local chain.
    #[error("wrong voteproof: {0}")]
    WrongVoteproof(String),
    /// A consensus operation did not finish in time.
    #[error("timeout: {0}")]
    Timeout(String),
    /// A local invariant was violated.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl IsaacError {
    /// Classifies the error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Hash(_) | Self::State(_) | Self::Seal(_) | Self::Crypto(_) => {
                ErrorKind::Validation
            }
            Self::Ballot(BallotError::Equivocation { .. }) => ErrorKind::Consensus,
            Self::Ballot(_) => ErrorKind::Validation,
            Self::Hint(HintError::Encode(_)) => ErrorKind::Fatal,
            Self::Hint(_) => ErrorKind::Decoding,
            Self::Block(_) | Self::WrongVoteproof(_) => ErrorKind::Consensus,
            Self::Storage(StorageError::Timeout) => ErrorKind::Transient,
            Self::Storage(_) => ErrorKind::Fatal,
            Self::Channel(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::Processor(e) => match e {
                ProcessorError::Storage(StorageError::Timeout)
                | ProcessorError::Channel(_)
                | ProcessorError::Timeout
                | ProcessorError::Cancelled => ErrorKind::Transient,
                ProcessorError::Storage(_) => ErrorKind::Fatal,
                _ => ErrorKind::Consensus,
            },
            Self::Invariant(_) => ErrorKind::Fatal,
        }
    }
}

impl ErrorCode for IsaacError {
    fn code(&self) -> &'static str {
        match self {
            Self::Hash(e) => e.code(),
            Self::Hint(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Seal(e) => e.code(),
            Self::Ballot(e) => e.code(),
            Self::Block(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Channel(e) => e.code(),
            Self::Processor(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::WrongVoteproof(_) => "CONSENSUS_WRONG_VOTEPROOF",
            Self::Timeout(_) => "CONSENSUS_TIMEOUT",
            Self::Invariant(_) => "CONSENSUS_INVARIANT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            IsaacError::from(StorageError::Backend("x".into())).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            IsaacError::from(StorageError::Timeout).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            IsaacError::from(ChannelError::Timeout).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            IsaacError::from(HintError::UnknownType("ff00".into())).kind(),
            ErrorKind::Decoding
        );
        assert_eq!(
            IsaacError::from(StateError::InvalidKey("a b".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            IsaacError::from(ProcessorError::Timeout).kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_codes_are_forwarded() {
        let err = IsaacError::from(ProcessorError::Storage(StorageError::Closed));
        assert_eq!(err.code(), "STORAGE_CLOSED");
        assert_eq!(
            IsaacError::WrongVoteproof("x".into()).code(),
            "CONSENSUS_WRONG_VOTEPROOF"
        );
    }
}
