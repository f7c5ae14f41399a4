// Path: crates/types/src/hint.rs
//! Type hints for self-describing, versioned encodings.
//!
//! Every polymorphic value carries a [`Hint`]: a two-byte type tag and a
//! semantic version. Two hints are compatible when they share the type and
//! the major version.

use crate::error::HintError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A two-byte type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HintType(pub [u8; 2]);

impl fmt::Display for HintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Incompatible changes.
    pub major: u16,
    /// Compatible additions.
    pub minor: u16,
    /// Fixes.
    pub patch: u16,
}

impl Version {
    /// Builds a version.
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = HintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix('v').unwrap_or(s);
        let mut parts = body.splitn(3, '.');
        let mut next = |name: &str| -> Result<u16, HintError> {
            parts
                .next()
                .ok_or_else(|| HintError::InvalidHint(format!("missing {name} in {s:?}")))?
                .parse::<u16>()
                .map_err(|e| HintError::InvalidHint(format!("{name} of {s:?}: {e}")))
        };
        Ok(Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        })
    }
}

/// A `(type, version)` pair identifying a concrete encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hint {
    ty: HintType,
    version: Version,
}

impl Hint {
    /// Builds a hint.
    pub const fn new(ty: [u8; 2], version: Version) -> Self {
        Self {
            ty: HintType(ty),
            version,
        }
    }

    /// The type tag.
    pub fn ty(&self) -> HintType {
        self.ty
    }

    /// The version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Same type and same major version.
    pub fn is_compatible(&self, other: &Hint) -> bool {
        self.ty == other.ty && self.version.major == other.version.major
    }

    /// Canonical bytes: the type tag followed by the version text.
    pub fn to_bytes(&self) -> Vec<u8> {
        let version = self.version.to_string();
        let mut out = Vec::with_capacity(2 + version.len());
        out.extend_from_slice(&self.ty.0);
        out.extend_from_slice(version.as_bytes());
        out
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ty, self.version)
    }
}

impl FromStr for Hint {
    type Err = HintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, version) = s
            .split_once(':')
            .ok_or_else(|| HintError::InvalidHint(s.to_string()))?;
        let raw = hex::decode(ty).map_err(|e| HintError::InvalidHint(e.to_string()))?;
        let ty: [u8; 2] = raw
            .try_into()
            .map_err(|_| HintError::InvalidHint(format!("type tag of {s:?}")))?;
        Ok(Self::new(ty, version.parse()?))
    }
}

impl Serialize for Hint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Implemented by every value that carries a [`Hint`].
pub trait Hinter {
    /// The hint of the concrete encoding of `self`.
    fn hint(&self) -> Hint;
}

/// The set of hints a node understands.
///
/// Threaded through construction instead of living in a global registry.
#[derive(Debug, Clone, Default)]
pub struct Hintset {
    known: BTreeMap<HintType, Hint>,
}

impl Hintset {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every hint defined by this crate.
    pub fn isaac() -> Self {
        let mut set = Self::new();
        for hint in hints::ALL {
            set.add(*hint);
        }
        set
    }

    /// Registers `hint`, replacing an older version of the same type.
    pub fn add(&mut self, hint: Hint) -> &mut Self {
        self.known.insert(hint.ty(), hint);
        self
    }

    /// Resolves `hint` against the registered one.
    pub fn check(&self, hint: &Hint) -> Result<Hint, HintError> {
        let known = self
            .known
            .get(&hint.ty())
            .ok_or_else(|| HintError::UnknownType(hint.ty().to_string()))?;
        if !known.is_compatible(hint) {
            return Err(HintError::VersionIncompatible {
                expected: known.to_string(),
                got: hint.to_string(),
            });
        }
        Ok(*known)
    }
}

/// Hints of every encoding defined by this crate.
pub mod hints {
    use super::{Hint, Version};

    const V0: Version = Version::new(0, 0, 1);

    /// Raw bytes value.
    pub const BYTES_VALUE: Hint = Hint::new([0x01, 0x01], V0);
    /// UTF-8 string value.
    pub const STRING_VALUE: Hint = Hint::new([0x01, 0x02], V0);
    /// Numeric value.
    pub const NUMBER_VALUE: Hint = Hint::new([0x01, 0x03], V0);
    /// Duration value.
    pub const DURATION_VALUE: Hint = Hint::new([0x01, 0x04], V0);
    /// Slice of values.
    pub const SLICE_VALUE: Hint = Hint::new([0x01, 0x05], V0);
    /// Generic hinted value.
    pub const HINTED_VALUE: Hint = Hint::new([0x01, 0x06], V0);
    /// State cell.
    pub const STATE: Hint = Hint::new([0x02, 0x01], V0);
    /// Key/value operation fact.
    pub const KEY_VALUE_FACT: Hint = Hint::new([0x03, 0x01], V0);
    /// Increment operation fact.
    pub const INCREMENT_FACT: Hint = Hint::new([0x03, 0x02], V0);
    /// Signed operation.
    pub const OPERATION: Hint = Hint::new([0x03, 0x10], V0);
    /// Operation seal.
    pub const OPERATION_SEAL: Hint = Hint::new([0x03, 0x11], V0);
    /// INIT ballot.
    pub const INIT_BALLOT: Hint = Hint::new([0x04, 0x01], V0);
    /// Proposal.
    pub const PROPOSAL: Hint = Hint::new([0x04, 0x02], V0);
    /// SIGN ballot.
    pub const SIGN_BALLOT: Hint = Hint::new([0x04, 0x03], V0);
    /// ACCEPT ballot.
    pub const ACCEPT_BALLOT: Hint = Hint::new([0x04, 0x04], V0);
    /// Voteproof.
    pub const VOTEPROOF: Hint = Hint::new([0x04, 0x10], V0);
    /// Block manifest.
    pub const MANIFEST: Hint = Hint::new([0x05, 0x01], V0);
    /// Block.
    pub const BLOCK: Hint = Hint::new([0x05, 0x02], V0);
    /// Suffrage info.
    pub const SUFFRAGE_INFO: Hint = Hint::new([0x05, 0x03], V0);
    /// Block data map.
    pub const BLOCKDATA_MAP: Hint = Hint::new([0x05, 0x04], V0);
    /// Immutable hash tree.
    pub const FIXED_TREE: Hint = Hint::new([0x05, 0x05], V0);

    /// All of the above.
    pub const ALL: &[Hint] = &[
        BYTES_VALUE,
        STRING_VALUE,
        NUMBER_VALUE,
        DURATION_VALUE,
        SLICE_VALUE,
        HINTED_VALUE,
        STATE,
        KEY_VALUE_FACT,
        INCREMENT_FACT,
        OPERATION,
        OPERATION_SEAL,
        INIT_BALLOT,
        PROPOSAL,
        SIGN_BALLOT,
        ACCEPT_BALLOT,
        VOTEPROOF,
        MANIFEST,
        BLOCK,
        SUFFRAGE_INFO,
        BLOCKDATA_MAP,
        FIXED_TREE,
    ];
}
