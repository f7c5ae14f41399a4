// Path: crates/types/src/codec.rs

//! The canonical binary codec and the hinted envelope.
//!
//! Bodies are `bincode`. A hinted blob prefixes the body with its hint:
//! `type(2) ‖ version-len(1) ‖ version-utf8 ‖ body`. Decoding reads the
//! header, resolves it against a [`Hintset`] and dispatches by type tag.

use crate::app::{
    Ballot, Block, BlockDataMap, FixedTree, Manifest, Operation, OperationSeal, State,
    SuffrageInfo, Value, Voteproof,
};
use crate::error::HintError;
use crate::hint::{hints, Hint, HintType, Hinter, Hintset, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, String> {
    bincode::serialize(v).map_err(|e| format!("canonical encode failed: {e}"))
}

/// Decodes a value from its canonical byte representation.
pub fn from_bytes_canonical<T: DeserializeOwned>(b: &[u8]) -> Result<T, String> {
    bincode::deserialize(b).map_err(|e| format!("canonical decode failed: {e}"))
}

/// Encodes `v` behind its hint header.
pub fn encode_hinted<T: Hinter + Serialize>(v: &T) -> Result<Vec<u8>, HintError> {
    let hint = v.hint();
    let version = hint.version().to_string();
    let len = u8::try_from(version.len())
        .map_err(|_| HintError::Encode(format!("version text of {hint} too long")))?;
    let body = to_bytes_canonical(v).map_err(HintError::Encode)?;
    let mut out = Vec::with_capacity(3 + version.len() + body.len());
    out.extend_from_slice(&hint.ty().0);
    out.push(len);
    out.extend_from_slice(version.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Splits a hinted blob into its hint and body.
pub fn read_hint(blob: &[u8]) -> Result<(Hint, &[u8]), HintError> {
    let short = || HintError::Decode("blob shorter than hint header".into());
    let (ty, rest) = blob.split_first_chunk::<2>().ok_or_else(short)?;
    let (len, rest) = rest.split_first().ok_or_else(short)?;
    let len = usize::from(*len);
    if rest.len() < len {
        return Err(short());
    }
    let (version, body) = rest.split_at(len);
    let version: Version = std::str::from_utf8(version)
        .map_err(|e| HintError::Decode(e.to_string()))?
        .parse()?;
    Ok((Hint::new(*ty, version), body))
}

/// Decodes a hinted blob of a statically known type.
pub fn decode_hinted<T: Hinter + DeserializeOwned>(
    blob: &[u8],
    hintset: &Hintset,
) -> Result<T, HintError> {
    let (hint, body) = read_hint(blob)?;
    hintset.check(&hint)?;
    let v: T = from_bytes_canonical(body).map_err(HintError::Decode)?;
    if v.hint().ty() != hint.ty() {
        return Err(HintError::Decode(format!(
            "header {hint} does not match body {}",
            v.hint()
        )));
    }
    Ok(v)
}

/// Any hinted value this crate defines.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Hinted {
    /// A state value.
    Value(Value),
    /// A state cell.
    State(State),
    /// A signed operation.
    Operation(Operation),
    /// An operation seal.
    OperationSeal(OperationSeal),
    /// A ballot of any stage.
    Ballot(Ballot),
    /// A voteproof.
    Voteproof(Voteproof),
    /// A manifest.
    Manifest(Manifest),
    /// A block.
    Block(Block),
    /// A suffrage info.
    SuffrageInfo(SuffrageInfo),
    /// A block data map.
    BlockDataMap(BlockDataMap),
    /// A hash tree.
    FixedTree(FixedTree),
}

fn is_one_of(ty: HintType, of: &[Hint]) -> bool {
    of.iter().any(|h| h.ty() == ty)
}

/// Decodes any hinted blob by dispatching on its type tag.
pub fn decode_any(blob: &[u8], hintset: &Hintset) -> Result<Hinted, HintError> {
    let (hint, _) = read_hint(blob)?;
    let ty = hint.ty();
    let values = [
        hints::BYTES_VALUE,
        hints::STRING_VALUE,
        hints::NUMBER_VALUE,
        hints::DURATION_VALUE,
        hints::SLICE_VALUE,
        hints::HINTED_VALUE,
    ];
    let ballots = [
        hints::INIT_BALLOT,
        hints::PROPOSAL,
        hints::SIGN_BALLOT,
        hints::ACCEPT_BALLOT,
    ];
    let decoded = if is_one_of(ty, &values) {
        Hinted::Value(decode_hinted(blob, hintset)?)
    } else if is_one_of(ty, &ballots) {
        Hinted::Ballot(decode_hinted(blob, hintset)?)
    } else if ty == hints::STATE.ty() {
        Hinted::State(decode_hinted(blob, hintset)?)
    } else if ty == hints::OPERATION.ty() {
        Hinted::Operation(decode_hinted(blob, hintset)?)
    } else if ty == hints::OPERATION_SEAL.ty() {
        Hinted::OperationSeal(decode_hinted(blob, hintset)?)
    } else if ty == hints::VOTEPROOF.ty() {
        Hinted::Voteproof(decode_hinted(blob, hintset)?)
    } else if ty == hints::MANIFEST.ty() {
        Hinted::Manifest(decode_hinted(blob, hintset)?)
    } else if ty == hints::BLOCK.ty() {
        Hinted::Block(decode_hinted(blob, hintset)?)
    } else if ty == hints::SUFFRAGE_INFO.ty() {
        Hinted::SuffrageInfo(decode_hinted(blob, hintset)?)
    } else if ty == hints::BLOCKDATA_MAP.ty() {
        Hinted::BlockDataMap(decode_hinted(blob, hintset)?)
    } else if ty == hints::FIXED_TREE.ty() {
        Hinted::FixedTree(decode_hinted(blob, hintset)?)
    } else {
        return Err(HintError::UnknownType(ty.to_string()));
    };
    Ok(decoded)
}
