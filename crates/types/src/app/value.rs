// Path: crates/types/src/app/value.rs
//! Typed, immutable state values.
//!
//! Each variant pre-computes `hash = SHA-256(canonical bytes)` and equality is
//! hash equality. Values are immutable; `set` always returns a new value.

use crate::app::Hash;
use crate::error::StateError;
use crate::hint::{hints, Hint, Hinter};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A number held by a [`NumberValue`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    Uint(u64),
    /// IEEE-754 double.
    Float(f64),
}

impl Number {
    fn to_be_bytes(self) -> [u8; 8] {
        match self {
            Self::Int(v) => v.to_be_bytes(),
            Self::Uint(v) => v.to_be_bytes(),
            Self::Float(v) => v.to_be_bytes(),
        }
    }
}

/// Raw bytes.
#[derive(Debug, Clone)]
pub struct BytesValue {
    value: Vec<u8>,
    hash: Hash,
}

impl BytesValue {
    /// Wraps `value`.
    pub fn new(value: Vec<u8>) -> Self {
        let hash = Hash::sha256(&value);
        Self { value, hash }
    }

    /// The wrapped bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// A new value holding `value`.
    pub fn set(&self, value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

/// UTF-8 text.
#[derive(Debug, Clone)]
pub struct StringValue {
    value: String,
    hash: Hash,
}

impl StringValue {
    /// Wraps `value`.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let hash = Hash::sha256(value.as_bytes());
        Self { value, hash }
    }

    /// The wrapped text.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// A new value holding `value`.
    pub fn set(&self, value: impl Into<String>) -> Self {
        Self::new(value)
    }
}

/// A signed, unsigned or floating point number.
#[derive(Debug, Clone)]
pub struct NumberValue {
    value: Number,
    hash: Hash,
}

impl NumberValue {
    /// Wraps `value`.
    pub fn new(value: Number) -> Self {
        let hash = Hash::sha256(value.to_be_bytes());
        Self { value, hash }
    }

    /// The wrapped number.
    pub fn value(&self) -> Number {
        self.value
    }

    /// A new value holding `value`.
    pub fn set(&self, value: Number) -> Self {
        Self::new(value)
    }
}

/// A duration, hashed as signed nanoseconds.
#[derive(Debug, Clone)]
pub struct DurationValue {
    nanos: i64,
    hash: Hash,
}

impl DurationValue {
    /// Wraps a nanosecond count.
    pub fn from_nanos(nanos: i64) -> Self {
        let hash = Hash::sha256(nanos.to_be_bytes());
        Self { nanos, hash }
    }

    /// Wraps a [`Duration`], saturating at `i64::MAX` nanoseconds.
    pub fn new(d: Duration) -> Self {
        Self::from_nanos(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }

    /// The nanosecond count.
    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    /// A new value holding `d`.
    pub fn set(&self, d: Duration) -> Self {
        Self::new(d)
    }
}

/// An ordered list of values.
#[derive(Debug, Clone)]
pub struct SliceValue {
    items: Vec<Value>,
    hash: Hash,
}

impl SliceValue {
    /// Wraps `items`.
    pub fn new(items: Vec<Value>) -> Self {
        let hash = Hash::sha256_concat(items.iter().map(|v| v.hash().as_bytes().to_vec()));
        Self { items, hash }
    }

    /// The wrapped values.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// A new value holding `items`.
    pub fn set(&self, items: Vec<Value>) -> Self {
        Self::new(items)
    }
}

/// An opaque hinted payload.
#[derive(Debug, Clone)]
pub struct HintedValue {
    inner: Hint,
    body: Vec<u8>,
    hash: Hash,
}

impl HintedValue {
    /// Wraps a payload of type `inner`.
    pub fn new(inner: Hint, body: Vec<u8>) -> Self {
        let hash = Hash::sha256_concat([inner.to_bytes(), body.clone()]);
        Self { inner, body, hash }
    }

    /// The hint of the payload.
    pub fn inner_hint(&self) -> Hint {
        self.inner
    }

    /// The payload.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A state value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "ValueRepr", from = "ValueRepr")]
pub enum Value {
    /// See [`BytesValue`].
    Bytes(BytesValue),
    /// See [`StringValue`].
    String(StringValue),
    /// See [`NumberValue`].
    Number(NumberValue),
    /// See [`DurationValue`].
    Duration(DurationValue),
    /// See [`SliceValue`].
    Slice(SliceValue),
    /// See [`HintedValue`].
    Hinted(HintedValue),
}

impl Value {
    /// A bytes value.
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(BytesValue::new(value.into()))
    }

    /// A string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(StringValue::new(value))
    }

    /// A signed integer value.
    pub fn int(value: i64) -> Self {
        Self::Number(NumberValue::new(Number::Int(value)))
    }

    /// An unsigned integer value.
    pub fn uint(value: u64) -> Self {
        Self::Number(NumberValue::new(Number::Uint(value)))
    }

    /// A float value.
    pub fn float(value: f64) -> Self {
        Self::Number(NumberValue::new(Number::Float(value)))
    }

    /// A duration value.
    pub fn duration(d: Duration) -> Self {
        Self::Duration(DurationValue::new(d))
    }

    /// A slice value.
    pub fn slice(items: Vec<Value>) -> Self {
        Self::Slice(SliceValue::new(items))
    }

    /// The pre-computed hash.
    pub fn hash(&self) -> &Hash {
        match self {
            Self::Bytes(v) => &v.hash,
            Self::String(v) => &v.hash,
            Self::Number(v) => &v.hash,
            Self::Duration(v) => &v.hash,
            Self::Slice(v) => &v.hash,
            Self::Hinted(v) => &v.hash,
        }
    }

    /// The canonical bytes the hash is computed from.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(v) => v.value.clone(),
            Self::String(v) => v.value.as_bytes().to_vec(),
            Self::Number(v) => v.value.to_be_bytes().to_vec(),
            Self::Duration(v) => v.nanos.to_be_bytes().to_vec(),
            Self::Slice(v) => v
                .items
                .iter()
                .flat_map(|i| i.hash().as_bytes().to_vec())
                .collect(),
            Self::Hinted(v) => [v.inner.to_bytes(), v.body.clone()].concat(),
        }
    }

    /// Recomputes the hash and checks nested values.
    pub fn is_valid(&self) -> Result<(), StateError> {
        if let Self::Number(NumberValue {
            value: Number::Float(f),
            ..
        }) = self
        {
            if !f.is_finite() {
                return Err(StateError::InvalidValue("non-finite number".into()));
            }
        }
        if let Self::Slice(s) = self {
            for item in &s.items {
                item.is_valid()?;
            }
        }
        if Hash::sha256(self.to_bytes()) != *self.hash() {
            return Err(StateError::InvalidValue("value hash mismatch".into()));
        }
        Ok(())
    }

    /// Hash equality.
    pub fn equal(&self, other: &Value) -> bool {
        self.hash() == other.hash()
    }

    /// Returns a new value of the same variant holding `inner`'s content.
    pub fn set(&self, inner: Value) -> Result<Value, StateError> {
        if std::mem::discriminant(self) != std::mem::discriminant(&inner) {
            return Err(StateError::InvalidValue(format!(
                "cannot set {} with {}",
                self.hint(),
                inner.hint()
            )));
        }
        Ok(inner)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for Value {}

impl Hinter for Value {
    fn hint(&self) -> Hint {
        match self {
            Self::Bytes(_) => hints::BYTES_VALUE,
            Self::String(_) => hints::STRING_VALUE,
            Self::Number(_) => hints::NUMBER_VALUE,
            Self::Duration(_) => hints::DURATION_VALUE,
            Self::Slice(_) => hints::SLICE_VALUE,
            Self::Hinted(_) => hints::HINTED_VALUE,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ValueRepr {
    Bytes(#[serde(with = "isaac_crypto::encoding::base58_bytes")] Vec<u8>),
    String(String),
    Number(Number),
    Duration(i64),
    Slice(Vec<Value>),
    Hinted {
        hint: Hint,
        #[serde(with = "isaac_crypto::encoding::base58_bytes")]
        body: Vec<u8>,
    },
}

impl From<Value> for ValueRepr {
    fn from(v: Value) -> Self {
        match v {
            Value::Bytes(v) => Self::Bytes(v.value),
            Value::String(v) => Self::String(v.value),
            Value::Number(v) => Self::Number(v.value),
            Value::Duration(v) => Self::Duration(v.nanos),
            Value::Slice(v) => Self::Slice(v.items),
            Value::Hinted(v) => Self::Hinted {
                hint: v.inner,
                body: v.body,
            },
        }
    }
}

impl From<ValueRepr> for Value {
    fn from(r: ValueRepr) -> Self {
        match r {
            ValueRepr::Bytes(b) => Value::Bytes(BytesValue::new(b)),
            ValueRepr::String(s) => Value::String(StringValue::new(s)),
            ValueRepr::Number(n) => Value::Number(NumberValue::new(n)),
            ValueRepr::Duration(n) => Value::Duration(DurationValue::from_nanos(n)),
            ValueRepr::Slice(items) => Value::Slice(SliceValue::new(items)),
            ValueRepr::Hinted { hint, body } => Value::Hinted(HintedValue::new(hint, body)),
        }
    }
}
