// Path: crates/types/src/app/seal.rs
//! Seals received from the network.

use crate::app::{Ballot, Hash, OperationSeal};
use crate::error::IsaacError;
use crate::hint::{Hint, Hinter};
use serde::{Deserialize, Serialize};

/// A signed envelope carrying either one ballot or a batch of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seal {
    /// A ballot of any stage.
    Ballot(Ballot),
    /// A batch of operations.
    Operation(OperationSeal),
}

impl Seal {
    /// The seal hash.
    pub fn hash(&self) -> &Hash {
        match self {
            Self::Ballot(b) => b.hash(),
            Self::Operation(s) => s.hash(),
        }
    }

    /// Verifies signatures and hashes.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), IsaacError> {
        match self {
            Self::Ballot(b) => b.is_valid(network_id)?,
            Self::Operation(s) => s.is_valid(network_id)?,
        }
        Ok(())
    }
}

impl Hinter for Seal {
    fn hint(&self) -> Hint {
        match self {
            Self::Ballot(b) => b.hint(),
            Self::Operation(s) => s.hint(),
        }
    }
}

impl From<Ballot> for Seal {
    fn from(b: Ballot) -> Self {
        Self::Ballot(b)
    }
}

impl From<OperationSeal> for Seal {
    fn from(s: OperationSeal) -> Self {
        Self::Operation(s)
    }
}
