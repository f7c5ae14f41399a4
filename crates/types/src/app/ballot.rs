// Path: crates/types/src/app/ballot.rs
//! Signed stage messages.

use crate::app::{Address, Hash, Height, Round, Stage, Timestamp, Voteproof};
use crate::error::BallotError;
use crate::hint::{hints, Hint, Hinter};
use isaac_crypto::sign::{Privatekey, Publickey, Signature};
use serde::{Deserialize, Serialize};

/// The stage-specific content a node votes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BallotFact {
    /// Opens `(height, round)` on top of `previous_block`.
    Init {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// Hash of the block at `height - 1`.
        previous_block: Hash,
    },
    /// The operations the proposer commits to include.
    Proposal {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// The proposer.
        proposer: Address,
        /// Fact hashes, in processing order.
        operations: Vec<Hash>,
        /// Hashes of the seals carrying `operations`.
        seals: Vec<Hash>,
    },
    /// A node processed `proposal` into `new_block`.
    Sign {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// Proposal fact hash.
        proposal: Hash,
        /// The block hash the node computed.
        new_block: Hash,
    },
    /// Agreement on `new_block`.
    Accept {
        /// Height.
        height: Height,
        /// Round.
        round: Round,
        /// Proposal fact hash.
        proposal: Hash,
        /// The block hash the node computed.
        new_block: Hash,
    },
}

impl BallotFact {
    /// The fact's height.
    pub fn height(&self) -> Height {
        match self {
            Self::Init { height, .. }
            | Self::Proposal { height, .. }
            | Self::Sign { height, .. }
            | Self::Accept { height, .. } => *height,
        }
    }

    /// The fact's round.
    pub fn round(&self) -> Round {
        match self {
            Self::Init { round, .. }
            | Self::Proposal { round, .. }
            | Self::Sign { round, .. }
            | Self::Accept { round, .. } => *round,
        }
    }

    /// The fact's stage.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Init { .. } => Stage::Init,
            Self::Proposal { .. } => Stage::Proposal,
            Self::Sign { .. } => Stage::Sign,
            Self::Accept { .. } => Stage::Accept,
        }
    }

    /// The new block of SIGN and ACCEPT facts.
    pub fn new_block(&self) -> Option<&Hash> {
        match self {
            Self::Sign { new_block, .. } | Self::Accept { new_block, .. } => Some(new_block),
            _ => None,
        }
    }

    /// The proposal of SIGN and ACCEPT facts.
    pub fn proposal(&self) -> Option<&Hash> {
        match self {
            Self::Sign { proposal, .. } | Self::Accept { proposal, .. } => Some(proposal),
            _ => None,
        }
    }

    /// Canonical bytes: hint ‖ height ‖ round ‖ payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.hint().to_bytes();
        out.extend_from_slice(&self.height().to_be_bytes());
        out.extend_from_slice(&self.round().to_be_bytes());
        match self {
            Self::Init { previous_block, .. } => out.extend_from_slice(previous_block.as_bytes()),
            Self::Proposal {
                proposer,
                operations,
                seals,
                ..
            } => {
                out.extend_from_slice(proposer.as_bytes());
                for h in operations.iter().chain(seals) {
                    out.extend_from_slice(h.as_bytes());
                }
            }
            Self::Sign {
                proposal, new_block, ..
            }
            | Self::Accept {
                proposal, new_block, ..
            } => {
                out.extend_from_slice(proposal.as_bytes());
                out.extend_from_slice(new_block.as_bytes());
            }
        }
        out
    }

    /// SHA-256 of the canonical bytes.
    pub fn generate_hash(&self) -> Hash {
        Hash::sha256(self.to_bytes())
    }

    fn is_valid(&self) -> Result<(), BallotError> {
        if self.height() < Height::GENESIS {
            return Err(BallotError::InvalidBallot(format!(
                "negative height {}",
                self.height()
            )));
        }
        if let Self::Proposal {
            operations, seals, ..
        } = self
        {
            let mut seen = std::collections::BTreeSet::new();
            if !operations.iter().all(|h| seen.insert(h)) {
                return Err(BallotError::InvalidBallot(
                    "duplicated operation in proposal".into(),
                ));
            }
            if operations.is_empty() != seals.is_empty() {
                return Err(BallotError::InvalidBallot(
                    "proposal operations and seals disagree".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Hinter for BallotFact {
    fn hint(&self) -> Hint {
        match self {
            Self::Init { .. } => hints::INIT_BALLOT,
            Self::Proposal { .. } => hints::PROPOSAL,
            Self::Sign { .. } => hints::SIGN_BALLOT,
            Self::Accept { .. } => hints::ACCEPT_BALLOT,
        }
    }
}

/// A signed ballot from one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    fact: BallotFact,
    fact_hash: Hash,
    fact_signature: Signature,
    node: Address,
    signer: Publickey,
    signed_at: Timestamp,
    voteproof: Option<Box<Voteproof>>,
    hash: Hash,
}

impl Ballot {
    /// Signs `fact` as `node`. `voteproof` is the one that justified it.
    pub fn new(
        fact: BallotFact,
        node: Address,
        key: &Privatekey,
        network_id: &[u8],
        voteproof: Option<Voteproof>,
    ) -> Result<Self, BallotError> {
        let fact_hash = fact.generate_hash();
        let fact_signature = key
            .sign(fact_hash.as_bytes(), network_id)
            .map_err(|_| BallotError::InvalidSignature(node.clone()))?;
        let mut ballot = Self {
            fact,
            fact_hash,
            fact_signature,
            node,
            signer: key.publickey(),
            signed_at: Timestamp::now(),
            voteproof: voteproof.map(Box::new),
            hash: Hash::sha256([]),
        };
        ballot.hash = ballot.generate_hash();
        Ok(ballot)
    }

    fn generate_hash(&self) -> Hash {
        let mut parts = vec![
            self.fact_hash.as_bytes().to_vec(),
            self.fact_signature.as_bytes().to_vec(),
            self.node.as_bytes().to_vec(),
            self.signer.to_bytes(),
            self.signed_at.to_be_bytes().to_vec(),
        ];
        if let Some(vp) = &self.voteproof {
            parts.push(vp.generate_hash().as_bytes().to_vec());
        }
        Hash::sha256_concat(parts)
    }

    /// The fact.
    pub fn fact(&self) -> &BallotFact {
        &self.fact
    }

    /// The fact hash that is voted on.
    pub fn fact_hash(&self) -> &Hash {
        &self.fact_hash
    }

    /// Signature over `fact_hash ‖ network_id`.
    pub fn fact_signature(&self) -> &Signature {
        &self.fact_signature
    }

    /// The voting node.
    pub fn node(&self) -> &Address {
        &self.node
    }

    /// The node's public key.
    pub fn signer(&self) -> &Publickey {
        &self.signer
    }

    /// When it was signed.
    pub fn signed_at(&self) -> Timestamp {
        self.signed_at
    }

    /// The voteproof that justified this ballot.
    pub fn voteproof(&self) -> Option<&Voteproof> {
        self.voteproof.as_deref()
    }

    /// The ballot hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Height of the fact.
    pub fn height(&self) -> Height {
        self.fact.height()
    }

    /// Round of the fact.
    pub fn round(&self) -> Round {
        self.fact.round()
    }

    /// Stage of the fact.
    pub fn stage(&self) -> Stage {
        self.fact.stage()
    }

    /// Verifies the fact, the signature, the hash and the carried voteproof.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), BallotError> {
        self.fact.is_valid()?;
        if self.fact.generate_hash() != self.fact_hash {
            return Err(BallotError::InvalidBallot("fact hash mismatch".into()));
        }
        self.signer
            .verify(self.fact_hash.as_bytes(), network_id, &self.fact_signature)
            .map_err(|_| BallotError::InvalidSignature(self.node.clone()))?;
        if self.generate_hash() != self.hash {
            return Err(BallotError::InvalidBallot("ballot hash mismatch".into()));
        }
        if let Some(vp) = &self.voteproof {
            vp.is_valid(network_id)
                .map_err(|e| BallotError::InvalidBallot(format!("carried voteproof: {e}")))?;
        }
        Ok(())
    }
}

impl Hinter for Ballot {
    fn hint(&self) -> Hint {
        self.fact.hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_crypto::sign::KeyKind;

    const NETWORK: &[u8] = b"isaac-test";

    fn init_fact() -> BallotFact {
        BallotFact::Init {
            height: Height(3),
            round: Round(1),
            previous_block: Hash::sha256(b"prev"),
        }
    }

    #[test]
    fn test_ballot_sign_and_verify() {
        let key = Privatekey::generate(KeyKind::Btc);
        let node = Address::new("n0").unwrap();
        let ballot = Ballot::new(init_fact(), node, &key, NETWORK, None).unwrap();
        assert!(ballot.is_valid(NETWORK).is_ok());
        assert_eq!(ballot.stage(), Stage::Init);
        assert_eq!(ballot.height(), Height(3));
        assert_eq!(ballot.round(), Round(1));
        assert!(matches!(
            ballot.is_valid(b"another-network"),
            Err(BallotError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_fact_hash_differs_by_stage() {
        let sign = BallotFact::Sign {
            height: Height(1),
            round: Round(0),
            proposal: Hash::sha256(b"p"),
            new_block: Hash::sha256(b"b"),
        };
        let accept = BallotFact::Accept {
            height: Height(1),
            round: Round(0),
            proposal: Hash::sha256(b"p"),
            new_block: Hash::sha256(b"b"),
        };
        assert_ne!(sign.generate_hash(), accept.generate_hash());
    }

    #[test]
    fn test_duplicated_proposal_operation_is_invalid() {
        let key = Privatekey::generate(KeyKind::Stellar);
        let op = Hash::sha256(b"op");
        let fact = BallotFact::Proposal {
            height: Height(1),
            round: Round(0),
            proposer: Address::new("n0").unwrap(),
            operations: vec![op.clone(), op],
            seals: vec![Hash::sha256(b"seal")],
        };
        let ballot = Ballot::new(fact, Address::new("n0").unwrap(), &key, NETWORK, None).unwrap();
        assert!(matches!(
            ballot.is_valid(NETWORK),
            Err(BallotError::InvalidBallot(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let key = Privatekey::generate(KeyKind::Ether);
        let ballot =
            Ballot::new(init_fact(), Address::new("n1").unwrap(), &key, NETWORK, None).unwrap();
        let json = serde_json::to_string(&ballot).unwrap();
        assert!(json.contains("\"INIT\""));
        let back: Ballot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ballot);
        assert!(back.is_valid(NETWORK).is_ok());
    }
}
