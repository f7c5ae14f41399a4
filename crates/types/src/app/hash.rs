// Path: crates/types/src/app/hash.rs
//! Content-addressed identifiers.

use crate::error::HashError;
use isaac_crypto::algorithms::hash::{sha256, sha256_concat, sha512};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SHA256_SIZE: usize = 32;
const SHA512_SIZE: usize = 64;

/// A SHA-256 or SHA-512 digest, written as base58 text.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(Vec<u8>);

impl Hash {
    /// SHA-256 of `data`.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        Self(sha256(data).to_vec())
    }

    /// SHA-512 of `data`.
    pub fn sha512(data: impl AsRef<[u8]>) -> Self {
        Self(sha512(data).to_vec())
    }

    /// SHA-256 of the concatenation of `parts`.
    pub fn sha256_concat<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self(sha256_concat(parts).to_vec())
    }

    /// Wraps raw digest bytes, rejecting anything that is not a digest.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, HashError> {
        match bytes.len() {
            0 => Err(HashError::Empty),
            SHA256_SIZE | SHA512_SIZE => Ok(Self(bytes)),
            n => Err(HashError::InvalidLength(n)),
        }
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is a SHA-512 digest.
    pub fn is_sha512(&self) -> bool {
        self.0.len() == SHA512_SIZE
    }

    /// Checks the digest length.
    pub fn is_valid(&self) -> Result<(), HashError> {
        match self.0.len() {
            0 => Err(HashError::Empty),
            SHA256_SIZE | SHA512_SIZE => Ok(()),
            n => Err(HashError::InvalidLength(n)),
        }
    }

    /// Whether both hashes carry the same digest.
    pub fn equal(&self, other: &Hash) -> bool {
        self == other
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(HashError::Empty);
        }
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| HashError::Decode(e.to_string()))?;
        Self::from_bytes(bytes)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        isaac_crypto::encoding::base58_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = isaac_crypto::encoding::base58_bytes::deserialize(deserializer)?;
        Self::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_roundtrip() {
        let h = Hash::sha256(b"isaac");
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert!(!h.is_sha512());
        assert!(Hash::sha512(b"isaac").is_sha512());
    }

    #[test]
    fn test_rejects_empty_and_odd_lengths() {
        assert_eq!(Hash::from_bytes(vec![]), Err(HashError::Empty));
        assert_eq!(Hash::from_bytes(vec![1; 31]), Err(HashError::InvalidLength(31)));
        assert_eq!("".parse::<Hash>(), Err(HashError::Empty));
    }

    #[test]
    fn test_serde_forms() {
        let h = Hash::sha256(b"x");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{h}\""));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        let raw = bincode::serialize(&h).unwrap();
        assert_eq!(bincode::deserialize::<Hash>(&raw).unwrap(), h);
    }
}
