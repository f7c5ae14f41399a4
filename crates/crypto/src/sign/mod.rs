// Path: crates/crypto/src/sign/mod.rs
//! Node signing keys.
//!
//! Keys are `libp2p` identity keys. The `btc` and `ether` kinds are
//! secp256k1 keys and the `stellar` kind is an ed25519 key, which covers the
//! curves used by the networks ISAAC nodes interoperate with. The text form of
//! a key is `<base58(protobuf)>~<kind>`.

use crate::error::CryptoError;
use libp2p::identity::{Keypair, PublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KIND_SEPARATOR: char = '~';

/// The curve family of a key, named after the network whose key format it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    /// secp256k1 as used by Bitcoin.
    Btc,
    /// secp256k1 as used by Ethereum.
    Ether,
    /// ed25519 as used by Stellar.
    Stellar,
}

impl KeyKind {
    /// The suffix used in the key text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Ether => "ether",
            Self::Stellar => "stellar",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyKind {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "btc" => Ok(Self::Btc),
            "ether" => Ok(Self::Ether),
            "stellar" => Ok(Self::Stellar),
            other => Err(CryptoError::InvalidKey(format!("unknown key kind {other:?}"))),
        }
    }
}

fn split_kind(s: &str) -> Result<(&str, KeyKind), CryptoError> {
    let (body, kind) = s
        .rsplit_once(KIND_SEPARATOR)
        .ok_or_else(|| CryptoError::InvalidKey(format!("missing key kind in {s:?}")))?;
    if body.is_empty() {
        return Err(CryptoError::InvalidKey("empty key body".into()));
    }
    Ok((body, kind.parse()?))
}

/// A private key able to sign payloads.
#[derive(Clone)]
pub struct Privatekey {
    kind: KeyKind,
    keypair: Keypair,
}

impl Privatekey {
    /// Generates a fresh key of the given kind.
    pub fn generate(kind: KeyKind) -> Self {
        let keypair = match kind {
            KeyKind::Btc | KeyKind::Ether => Keypair::generate_secp256k1(),
            KeyKind::Stellar => Keypair::generate_ed25519(),
        };
        Self { kind, keypair }
    }

    /// The kind of this key.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the matching public key.
    pub fn publickey(&self) -> Publickey {
        Publickey {
            kind: self.kind,
            key: self.keypair.public(),
        }
    }

    /// Signs `payload ‖ network_id`.
    pub fn sign(&self, payload: &[u8], network_id: &[u8]) -> Result<Signature, CryptoError> {
        let message = [payload, network_id].concat();
        self.keypair
            .sign(&message)
            .map(Signature)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }

    fn encode(&self) -> Result<String, CryptoError> {
        let raw = self
            .keypair
            .to_protobuf_encoding()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(format!(
            "{}{}{}",
            bs58::encode(raw).into_string(),
            KIND_SEPARATOR,
            self.kind
        ))
    }

    /// The `<base58>~<kind>` text form.
    pub fn to_text(&self) -> Result<String, CryptoError> {
        self.encode()
    }
}

impl fmt::Debug for Privatekey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Privatekey({}, {})", self.kind, self.publickey())
    }
}

impl FromStr for Privatekey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, kind) = split_kind(s)?;
        let raw = bs58::decode(body)
            .into_vec()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let keypair = Keypair::from_protobuf_encoding(&raw)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { kind, keypair })
    }
}

/// A public key able to verify signatures made by its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct Publickey {
    kind: KeyKind,
    key: PublicKey,
}

impl Publickey {
    /// The kind of this key.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Canonical bytes of the key, used inside hashes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.encode_protobuf()
    }

    /// Verifies a signature over `payload ‖ network_id`.
    pub fn verify(
        &self,
        payload: &[u8],
        network_id: &[u8],
        signature: &Signature,
    ) -> Result<(), CryptoError> {
        let message = [payload, network_id].concat();
        if self.key.verify(&message, &signature.0) {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}

impl fmt::Display for Publickey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            bs58::encode(self.to_bytes()).into_string(),
            KIND_SEPARATOR,
            self.kind
        )
    }
}

impl fmt::Debug for Publickey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Publickey({self})")
    }
}

impl FromStr for Publickey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, kind) = split_kind(s)?;
        let raw = bs58::decode(body)
            .into_vec()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = PublicKey::try_decode_protobuf(&raw)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { kind, key })
    }
}

impl Serialize for Publickey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Publickey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A raw signature produced by a [`Privatekey`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "crate::encoding::base58_bytes")] Vec<u8>);

impl Signature {
    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wraps raw signature bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", bs58::encode(&self.0).into_string())
    }
}

#[cfg(test)]
mod tests;
