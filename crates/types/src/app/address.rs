// Path: crates/types/src/app/address.rs
//! Node addresses.

use crate::error::StateError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A node address: a non-empty UTF-8 string without whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address string.
    pub fn new(s: impl Into<String>) -> Result<Self, StateError> {
        let s = s.into();
        if !is_valid_key(&s) {
            return Err(StateError::InvalidKey(s));
        }
        Ok(Self(s))
    }

    /// The address text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes of the address.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Whether `s` is usable as a state key or address.
pub fn is_valid_key(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_whitespace_and_empty() {
        assert!(Address::new("n0").is_ok());
        assert!(Address::new("").is_err());
        assert!(Address::new("n 0").is_err());
        assert!(Address::new("n0\n").is_err());
        assert!(serde_json::from_str::<Address>("\"a\\tb\"").is_err());
    }
}
