// Path: crates/types/src/app/operation.rs
//! Operations, their facts and the seals that carry them.

use crate::app::{address::is_valid_key, Hash, Timestamp};
use crate::error::{SealError, StateError};
use crate::hint::{hints, Hint, Hinter};
use isaac_crypto::sign::{Privatekey, Publickey, Signature};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The maximum number of operations one seal may carry.
pub const MAX_OPERATIONS_IN_SEAL: usize = 100;

/// The content of an operation. Closed set of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationFact {
    /// Sets `key` to a bytes value.
    KeyValue {
        /// Target key.
        key: String,
        /// New value.
        #[serde(with = "isaac_crypto::encoding::base58_bytes")]
        value: Vec<u8>,
        /// Uniqueness token, usually a timestamp or nonce.
        #[serde(with = "isaac_crypto::encoding::base58_bytes")]
        token: Vec<u8>,
    },
    /// Adds `amount` to the signed number stored under `key`.
    Increment {
        /// Target key.
        key: String,
        /// Amount to add.
        amount: i64,
        /// Uniqueness token.
        #[serde(with = "isaac_crypto::encoding::base58_bytes")]
        token: Vec<u8>,
    },
}

impl OperationFact {
    /// A key-value fact with a fresh token.
    pub fn key_value(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::KeyValue {
            key: key.into(),
            value: value.into(),
            token: fresh_token(),
        }
    }

    /// An increment fact with a fresh token.
    pub fn increment(key: impl Into<String>, amount: i64) -> Self {
        Self::Increment {
            key: key.into(),
            amount,
            token: fresh_token(),
        }
    }

    /// The state key this fact touches.
    pub fn key(&self) -> &str {
        match self {
            Self::KeyValue { key, .. } | Self::Increment { key, .. } => key,
        }
    }

    /// Canonical bytes: hint ‖ key ‖ payload ‖ token.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.hint().to_bytes();
        match self {
            Self::KeyValue { key, value, token } => {
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(value);
                out.extend_from_slice(token);
            }
            Self::Increment { key, amount, token } => {
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&amount.to_be_bytes());
                out.extend_from_slice(token);
            }
        }
        out
    }

    /// SHA-256 of the canonical bytes.
    pub fn generate_hash(&self) -> Hash {
        Hash::sha256(self.to_bytes())
    }

    /// Checks the key and token.
    pub fn is_valid(&self) -> Result<(), StateError> {
        if !is_valid_key(self.key()) {
            return Err(StateError::InvalidKey(self.key().to_string()));
        }
        let token = match self {
            Self::KeyValue { token, .. } | Self::Increment { token, .. } => token,
        };
        if token.is_empty() {
            return Err(StateError::Validation("empty fact token".into()));
        }
        Ok(())
    }
}

impl Hinter for OperationFact {
    fn hint(&self) -> Hint {
        match self {
            Self::KeyValue { .. } => hints::KEY_VALUE_FACT,
            Self::Increment { .. } => hints::INCREMENT_FACT,
        }
    }
}

/// A signature over a fact hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSign {
    /// The signing key.
    pub signer: Publickey,
    /// Signature over `fact_hash ‖ network_id`.
    pub signature: Signature,
    /// When it was signed.
    pub signed_at: Timestamp,
}

impl FactSign {
    fn to_bytes(&self) -> Vec<u8> {
        [
            self.signer.to_bytes(),
            self.signature.as_bytes().to_vec(),
            self.signed_at.to_be_bytes().to_vec(),
        ]
        .concat()
    }
}

/// A signed fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    fact: OperationFact,
    fact_hash: Hash,
    fact_signs: Vec<FactSign>,
    hash: Hash,
}

impl Operation {
    /// Signs `fact` with `key`.
    pub fn new(fact: OperationFact, key: &Privatekey, network_id: &[u8]) -> Result<Self, SealError> {
        let fact_hash = fact.generate_hash();
        let signature = key
            .sign(fact_hash.as_bytes(), network_id)
            .map_err(|e| SealError::InvalidSignature(e.to_string()))?;
        let fact_signs = vec![FactSign {
            signer: key.publickey(),
            signature,
            signed_at: Timestamp::now(),
        }];
        let hash = Self::compute_hash(&fact_hash, &fact_signs);
        Ok(Self {
            fact,
            fact_hash,
            fact_signs,
            hash,
        })
    }

    fn compute_hash(fact_hash: &Hash, fact_signs: &[FactSign]) -> Hash {
        let mut parts = vec![fact_hash.as_bytes().to_vec()];
        parts.extend(fact_signs.iter().map(FactSign::to_bytes));
        Hash::sha256_concat(parts)
    }

    /// The fact.
    pub fn fact(&self) -> &OperationFact {
        &self.fact
    }

    /// The fact hash, which identifies the operation for idempotence.
    pub fn fact_hash(&self) -> &Hash {
        &self.fact_hash
    }

    /// Signatures over the fact.
    pub fn fact_signs(&self) -> &[FactSign] {
        &self.fact_signs
    }

    /// The operation hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Verifies the fact, every fact signature and both hashes.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), SealError> {
        self.fact
            .is_valid()
            .map_err(|e| SealError::Invalid(e.to_string()))?;
        if self.fact.generate_hash() != self.fact_hash {
            return Err(SealError::HashMismatch("operation fact"));
        }
        if self.fact_signs.is_empty() {
            return Err(SealError::Invalid("operation without fact signs".into()));
        }
        for sign in &self.fact_signs {
            sign.signer
                .verify(self.fact_hash.as_bytes(), network_id, &sign.signature)
                .map_err(|e| SealError::InvalidSignature(e.to_string()))?;
        }
        if Self::compute_hash(&self.fact_hash, &self.fact_signs) != self.hash {
            return Err(SealError::HashMismatch("operation"));
        }
        Ok(())
    }
}

impl Hinter for Operation {
    fn hint(&self) -> Hint {
        hints::OPERATION
    }
}

/// A signed envelope bundling operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSeal {
    operations: Vec<Operation>,
    signer: Publickey,
    signature: Signature,
    signed_at: Timestamp,
    hash: Hash,
}

impl OperationSeal {
    /// Seals `operations` with `key`.
    pub fn new(
        operations: Vec<Operation>,
        key: &Privatekey,
        network_id: &[u8],
    ) -> Result<Self, SealError> {
        check_operations_count(operations.len())?;
        let signer = key.publickey();
        let signed_at = Timestamp::now();
        let body = Self::body_hash(&operations, &signer, signed_at);
        let signature = key
            .sign(body.as_bytes(), network_id)
            .map_err(|e| SealError::InvalidSignature(e.to_string()))?;
        let hash = Hash::sha256_concat([body.as_bytes(), signature.as_bytes()]);
        Ok(Self {
            operations,
            signer,
            signature,
            signed_at,
            hash,
        })
    }

    fn body_hash(operations: &[Operation], signer: &Publickey, signed_at: Timestamp) -> Hash {
        let mut parts: Vec<Vec<u8>> = operations
            .iter()
            .map(|op| op.hash().as_bytes().to_vec())
            .collect();
        parts.push(signer.to_bytes());
        parts.push(signed_at.to_be_bytes().to_vec());
        Hash::sha256_concat(parts)
    }

    /// The sealed operations.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The sealing key.
    pub fn signer(&self) -> &Publickey {
        &self.signer
    }

    /// When it was sealed.
    pub fn signed_at(&self) -> Timestamp {
        self.signed_at
    }

    /// The seal hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Verifies the envelope and every operation inside.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), SealError> {
        check_operations_count(self.operations.len())?;
        let body = Self::body_hash(&self.operations, &self.signer, self.signed_at);
        self.signer
            .verify(body.as_bytes(), network_id, &self.signature)
            .map_err(|e| SealError::InvalidSignature(e.to_string()))?;
        if Hash::sha256_concat([body.as_bytes(), self.signature.as_bytes()]) != self.hash {
            return Err(SealError::HashMismatch("operation seal"));
        }
        for op in &self.operations {
            op.is_valid(network_id)?;
        }
        Ok(())
    }
}

impl Hinter for OperationSeal {
    fn hint(&self) -> Hint {
        hints::OPERATION_SEAL
    }
}

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

fn fresh_token() -> Vec<u8> {
    let seq = TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
    [Timestamp::now().to_be_bytes(), seq.to_be_bytes()].concat()
}

fn check_operations_count(got: usize) -> Result<(), SealError> {
    if got == 0 {
        return Err(SealError::EmptyOperations);
    }
    if got > MAX_OPERATIONS_IN_SEAL {
        return Err(SealError::TooManyOperations {
            got,
            max: MAX_OPERATIONS_IN_SEAL,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_crypto::sign::KeyKind;

    const NETWORK: &[u8] = b"isaac-test";

    #[test]
    fn test_operation_sign_and_verify() {
        let key = Privatekey::generate(KeyKind::Btc);
        let op = Operation::new(OperationFact::key_value("k", vec![1]), &key, NETWORK).unwrap();
        assert!(op.is_valid(NETWORK).is_ok());
        assert!(matches!(
            op.is_valid(b"other"),
            Err(SealError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_fact_hash_identifies_content() {
        let fact = OperationFact::KeyValue {
            key: "k".into(),
            value: vec![1],
            token: vec![9],
        };
        let a = Operation::new(fact.clone(), &Privatekey::generate(KeyKind::Stellar), NETWORK).unwrap();
        let b = Operation::new(fact, &Privatekey::generate(KeyKind::Ether), NETWORK).unwrap();
        assert_eq!(a.fact_hash(), b.fact_hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_invalid_fact_key() {
        let key = Privatekey::generate(KeyKind::Btc);
        let op = Operation::new(OperationFact::key_value("bad key", vec![1]), &key, NETWORK).unwrap();
        assert!(matches!(op.is_valid(NETWORK), Err(SealError::Invalid(_))));
    }

    #[test]
    fn test_empty_seal_is_rejected() {
        let key = Privatekey::generate(KeyKind::Btc);
        assert_eq!(
            OperationSeal::new(vec![], &key, NETWORK),
            Err(SealError::EmptyOperations)
        );
    }

    #[test]
    fn test_seal_limits_operations() {
        let key = Privatekey::generate(KeyKind::Stellar);
        let op = Operation::new(OperationFact::increment("n", 1), &key, NETWORK).unwrap();
        let ops = vec![op; MAX_OPERATIONS_IN_SEAL + 1];
        assert!(matches!(
            OperationSeal::new(ops, &key, NETWORK),
            Err(SealError::TooManyOperations { .. })
        ));
    }

    #[test]
    fn test_seal_roundtrip_keeps_validity() {
        let key = Privatekey::generate(KeyKind::Btc);
        let op = Operation::new(OperationFact::key_value("k", vec![1]), &key, NETWORK).unwrap();
        let seal = OperationSeal::new(vec![op], &key, NETWORK).unwrap();
        let json = serde_json::to_vec(&seal).unwrap();
        let back: OperationSeal = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, seal);
        assert!(back.is_valid(NETWORK).is_ok());
    }
}
