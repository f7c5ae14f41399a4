// Path: crates/types/src/app/state.rs
//! Versioned state cells keyed by string.

use crate::app::{address::is_valid_key, Hash, Height, Value};
use crate::error::StateError;
use crate::hint::{hints, Hint, Hinter};
use serde::{Deserialize, Serialize};

/// One cell of the world state.
///
/// Builder methods return a new cell with the hash cleared; the hash is
/// attached once with [`State::set_hash`] and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    key: String,
    value: Option<Value>,
    height: Height,
    previous_block: Option<Hash>,
    operations: Vec<Hash>,
    hash: Option<Hash>,
}

impl State {
    /// An empty cell at `height`.
    pub fn new(key: impl Into<String>, value: Option<Value>, height: Height) -> Result<Self, StateError> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(StateError::InvalidKey(key));
        }
        Ok(Self {
            key,
            value,
            height,
            previous_block: None,
            operations: Vec::new(),
            hash: None,
        })
    }

    /// The state key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The height of the block that last wrote this cell.
    pub fn height(&self) -> Height {
        self.height
    }

    /// The block this cell's height builds on.
    pub fn previous_block(&self) -> Option<&Hash> {
        self.previous_block.as_ref()
    }

    /// Fact hashes of the operations that touched this cell, in order.
    pub fn operations(&self) -> &[Hash] {
        &self.operations
    }

    /// The attached hash.
    pub fn hash(&self) -> Option<&Hash> {
        self.hash.as_ref()
    }

    /// Replaces the value.
    pub fn set_value(&self, value: Option<Value>) -> Self {
        Self {
            value,
            hash: None,
            ..self.clone()
        }
    }

    /// Replaces the height.
    pub fn set_height(&self, height: Height) -> Self {
        Self {
            height,
            hash: None,
            ..self.clone()
        }
    }

    /// Replaces the previous block.
    pub fn set_previous_block(&self, previous_block: Hash) -> Self {
        Self {
            previous_block: Some(previous_block),
            hash: None,
            ..self.clone()
        }
    }

    /// Appends `fact` unless already recorded.
    pub fn add_operation(&self, fact: Hash) -> Self {
        let mut next = self.clone();
        next.hash = None;
        if !next.operations.contains(&fact) {
            next.operations.push(fact);
        }
        next
    }

    /// Drops every recorded operation.
    pub fn clear_operations(&self) -> Self {
        Self {
            operations: Vec::new(),
            hash: None,
            ..self.clone()
        }
    }

    /// Hash over `key ‖ value.hash ‖ previous_block ‖ operations`.
    pub fn generate_hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = vec![self.key.as_bytes()];
        if let Some(v) = &self.value {
            parts.push(v.hash().as_bytes());
        }
        if let Some(p) = &self.previous_block {
            parts.push(p.as_bytes());
        }
        parts.extend(self.operations.iter().map(Hash::as_bytes));
        Hash::sha256_concat(parts)
    }

    /// Attaches the generated hash. Fails when a hash is already attached.
    pub fn set_hash(mut self) -> Result<Self, StateError> {
        if self.hash.is_some() {
            return Err(StateError::HashAlreadySet(self.key));
        }
        self.hash = Some(self.generate_hash());
        Ok(self)
    }

    /// Merges `other` into `self`.
    ///
    /// Keeps `self`'s value when `other` has none. A lower `other.height` is
    /// rejected.
    pub fn merge(&self, other: &State) -> Result<State, StateError> {
        if self.key != other.key {
            return Err(StateError::KeyMismatch {
                left: self.key.clone(),
                right: other.key.clone(),
            });
        }
        if other.height < self.height {
            return Err(StateError::HeightRegression {
                key: self.key.clone(),
                current: self.height,
                incoming: other.height,
            });
        }
        let mut operations = self.operations.clone();
        for op in &other.operations {
            if !operations.contains(op) {
                operations.push(op.clone());
            }
        }
        Ok(State {
            key: self.key.clone(),
            value: other.value.clone().or_else(|| self.value.clone()),
            height: other.height,
            previous_block: other
                .previous_block
                .clone()
                .or_else(|| self.previous_block.clone()),
            operations,
            hash: None,
        })
    }

    /// Checks the key, value and attached hash.
    pub fn is_valid(&self) -> Result<(), StateError> {
        if !is_valid_key(&self.key) {
            return Err(StateError::InvalidKey(self.key.clone()));
        }
        if let Some(v) = &self.value {
            v.is_valid()?;
        }
        for (i, op) in self.operations.iter().enumerate() {
            if self.operations.iter().skip(i + 1).any(|o| o == op) {
                return Err(StateError::Validation(format!(
                    "duplicated operation {op} in {}",
                    self.key
                )));
            }
        }
        match &self.hash {
            Some(h) if *h != self.generate_hash() => Err(StateError::Validation(format!(
                "hash mismatch for {}",
                self.key
            ))),
            _ => Ok(()),
        }
    }
}

impl Hinter for State {
    fn hint(&self) -> Hint {
        hints::STATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(key: &str) -> State {
        State::new(key, Some(Value::bytes(vec![1])), Height(3)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_keys() {
        assert!(matches!(
            State::new("", None, Height(0)),
            Err(StateError::InvalidKey(_))
        ));
        assert!(matches!(
            State::new("a b", None, Height(0)),
            Err(StateError::InvalidKey(_))
        ));
        assert!(State::new("a\tb", None, Height(0)).is_err());
    }

    #[test]
    fn test_hash_layout() {
        let prev = Hash::sha256(b"prev");
        let op = Hash::sha256(b"op");
        let s = state("k")
            .set_previous_block(prev.clone())
            .add_operation(op.clone())
            .set_hash()
            .unwrap();
        let expected = Hash::sha256(
            [
                b"k".as_slice(),
                Value::bytes(vec![1]).hash().as_bytes(),
                prev.as_bytes(),
                op.as_bytes(),
            ]
            .concat(),
        );
        assert_eq!(s.hash(), Some(&expected));
        assert!(s.is_valid().is_ok());
    }

    #[test]
    fn test_hash_is_set_once() {
        let s = state("k").set_hash().unwrap();
        assert!(matches!(s.set_hash(), Err(StateError::HashAlreadySet(_))));
    }

    #[test]
    fn test_operations_are_deduplicated() {
        let op = Hash::sha256(b"op");
        let s = state("k").add_operation(op.clone()).add_operation(op);
        assert_eq!(s.operations().len(), 1);
    }

    #[test]
    fn test_merge() {
        let a = state("k");
        let b = State::new("k", None, Height(4)).unwrap();
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.value(), a.value());
        assert_eq!(merged.height(), Height(4));

        let c = State::new("k", Some(Value::string("new")), Height(4)).unwrap();
        assert_eq!(a.merge(&c).unwrap().value(), Some(&Value::string("new")));

        let other = state("j");
        assert!(matches!(
            a.merge(&other),
            Err(StateError::KeyMismatch { .. })
        ));

        let lower = State::new("k", None, Height(1)).unwrap();
        assert!(matches!(
            a.merge(&lower),
            Err(StateError::HeightRegression { .. })
        ));
    }

    #[test]
    fn test_tampered_hash_is_invalid() {
        let s = state("k").set_hash().unwrap();
        let mut json: serde_json::Value = serde_json::to_value(&s).unwrap();
        json["key"] = serde_json::Value::String("z".into());
        let tampered: State = serde_json::from_value(json).unwrap();
        assert!(tampered.is_valid().is_err());
    }
}
