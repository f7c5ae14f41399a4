// Path: crates/types/src/app/height.rs
//! Block height, consensus round and ballot stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A block height. `NIL` denotes "before genesis".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Height(pub i64);

impl Height {
    /// The height before genesis.
    pub const NIL: Height = Height(-1);
    /// The genesis height.
    pub const GENESIS: Height = Height(0);

    /// The following height.
    pub fn next(self) -> Height {
        Height(self.0.saturating_add(1))
    }

    /// The preceding height.
    pub fn prev(self) -> Height {
        Height(self.0.saturating_sub(1))
    }

    /// Big-endian two's complement bytes.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The raw value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The attempt counter within one height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Round(pub u64);

impl Round {
    /// The first round of a height.
    pub const ZERO: Round = Round(0);

    /// The following round.
    pub fn next(self) -> Round {
        Round(self.0.saturating_add(1))
    }

    /// Big-endian bytes.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stage of a ballot within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Opens a round, agreeing on the previous block.
    Init,
    /// The proposer's list of operations.
    Proposal,
    /// A node processed the proposal.
    Sign,
    /// Agreement on the new block.
    Accept,
}

impl Stage {
    /// The canonical one-byte tag used inside hashes.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Init => 0x01,
            Self::Proposal => 0x02,
            Self::Sign => 0x03,
            Self::Accept => 0x04,
        }
    }

    /// Whether ballots of this stage are voted in the ballotbox.
    pub fn can_vote(self) -> bool {
        !matches!(self, Self::Proposal)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Proposal => "PROPOSAL",
            Self::Sign => "SIGN",
            Self::Accept => "ACCEPT",
        })
    }
}
