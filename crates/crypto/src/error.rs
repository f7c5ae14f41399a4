// Path: crates/crypto/src/error.rs
//! Local error types for the `isaac-crypto` crate.

use thiserror::Error;

/// Errors raised while hashing, parsing keys or producing signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The digest did not have the expected length.
    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },
    /// A key could not be parsed or has an unsupported kind.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Signing failed in the key backend.
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// A signature did not verify against the given public key.
    #[error("signature verification failed")]
    VerificationFailed,
}
