// Path: crates/storage/src/database/tables.rs
//! Table layout and the write helpers shared by every write path.

use isaac_types::app::{
    Ballot, BallotFact, Block, BlockDataMap, Hash, Height, Manifest, Seal, Stage, State,
    Voteproof,
};
use isaac_types::codec;
use isaac_types::error::StorageError;
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

/// block hash -> manifest
pub(crate) const MANIFESTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("MANIFESTS");
/// height -> block hash
pub(crate) const HEIGHTS: TableDefinition<i64, &[u8]> = TableDefinition::new("HEIGHTS");
/// block hash -> block
pub(crate) const BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BLOCKS");
/// height -> block data map
pub(crate) const BLOCKDATA_MAPS: TableDefinition<i64, &[u8]> =
    TableDefinition::new("BLOCKDATA_MAPS");
/// operation fact hash -> height of the block that carries it
pub(crate) const OPERATIONS: TableDefinition<&[u8], i64> = TableDefinition::new("OPERATIONS");
/// seal hash -> seal
pub(crate) const SEALS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("SEALS");
/// insertion sequence -> staged operation seal hash
pub(crate) const STAGED: TableDefinition<u64, &[u8]> = TableDefinition::new("STAGED");
/// staged operation seal hash -> insertion sequence
pub(crate) const STAGED_INDEX: TableDefinition<&[u8], u64> = TableDefinition::new("STAGED_INDEX");
/// proposal fact hash -> proposal ballot
pub(crate) const PROPOSALS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("PROPOSALS");
/// (height, round) -> proposal fact hash
pub(crate) const PROPOSAL_INDEX: TableDefinition<(i64, u64), &[u8]> =
    TableDefinition::new("PROPOSAL_INDEX");
/// state key -> state
pub(crate) const STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("STATES");
/// (height, stage) -> voteproof
pub(crate) const VOTEPROOFS: TableDefinition<(i64, u8), &[u8]> =
    TableDefinition::new("VOTEPROOFS");
/// counters
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("META");

const SEAL_SEQUENCE: &str = "seal_sequence";

pub(crate) fn backend<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub(crate) fn encode<T: Serialize>(v: &T) -> Result<Vec<u8>, StorageError> {
    codec::to_bytes_canonical(v).map_err(StorageError::Encode)
}

pub(crate) fn decode<T: DeserializeOwned>(b: &[u8]) -> Result<T, StorageError> {
    codec::from_bytes_canonical(b).map_err(StorageError::Decode)
}

pub(crate) fn create_all(w: &WriteTransaction<'_>) -> Result<(), StorageError> {
    w.open_table(MANIFESTS).map_err(backend)?;
    w.open_table(HEIGHTS).map_err(backend)?;
    w.open_table(BLOCKS).map_err(backend)?;
    w.open_table(BLOCKDATA_MAPS).map_err(backend)?;
    w.open_table(OPERATIONS).map_err(backend)?;
    w.open_table(SEALS).map_err(backend)?;
    w.open_table(STAGED).map_err(backend)?;
    w.open_table(STAGED_INDEX).map_err(backend)?;
    w.open_table(PROPOSALS).map_err(backend)?;
    w.open_table(PROPOSAL_INDEX).map_err(backend)?;
    w.open_table(STATES).map_err(backend)?;
    w.open_table(VOTEPROOFS).map_err(backend)?;
    w.open_table(META).map_err(backend)?;
    Ok(())
}

pub(crate) fn drop_all(w: &WriteTransaction<'_>) -> Result<(), StorageError> {
    w.delete_table(MANIFESTS).map_err(backend)?;
    w.delete_table(HEIGHTS).map_err(backend)?;
    w.delete_table(BLOCKS).map_err(backend)?;
    w.delete_table(BLOCKDATA_MAPS).map_err(backend)?;
    w.delete_table(OPERATIONS).map_err(backend)?;
    w.delete_table(SEALS).map_err(backend)?;
    w.delete_table(STAGED).map_err(backend)?;
    w.delete_table(STAGED_INDEX).map_err(backend)?;
    w.delete_table(PROPOSALS).map_err(backend)?;
    w.delete_table(PROPOSAL_INDEX).map_err(backend)?;
    w.delete_table(STATES).map_err(backend)?;
    w.delete_table(VOTEPROOFS).map_err(backend)?;
    w.delete_table(META).map_err(backend)?;
    create_all(w)
}

/// Stores seals not seen before. Operation seals are staged in arrival
/// order.
pub(crate) fn put_seals(w: &WriteTransaction<'_>, seals: &[Seal]) -> Result<usize, StorageError> {
    let mut table = w.open_table(SEALS).map_err(backend)?;
    let mut staged = w.open_table(STAGED).map_err(backend)?;
    let mut index = w.open_table(STAGED_INDEX).map_err(backend)?;
    let mut meta = w.open_table(META).map_err(backend)?;

    let mut sequence = meta
        .get(SEAL_SEQUENCE)
        .map_err(backend)?
        .map(|v| v.value())
        .unwrap_or(0);
    let mut stored = 0;
    for seal in seals {
        let key = seal.hash().as_bytes();
        if table.get(key).map_err(backend)?.is_some() {
            continue;
        }
        table.insert(key, encode(seal)?.as_slice()).map_err(backend)?;
        if matches!(seal, Seal::Operation(_)) {
            sequence += 1;
            staged.insert(sequence, key).map_err(backend)?;
            index.insert(key, sequence).map_err(backend)?;
        }
        stored += 1;
    }
    meta.insert(SEAL_SEQUENCE, sequence).map_err(backend)?;
    Ok(stored)
}

pub(crate) fn unstage(w: &WriteTransaction<'_>, hashes: &[Hash]) -> Result<(), StorageError> {
    let mut staged = w.open_table(STAGED).map_err(backend)?;
    let mut index = w.open_table(STAGED_INDEX).map_err(backend)?;
    for h in hashes {
        let sequence = index
            .remove(h.as_bytes())
            .map_err(backend)?
            .map(|v| v.value());
        if let Some(sequence) = sequence {
            staged.remove(sequence).map_err(backend)?;
        }
    }
    Ok(())
}

pub(crate) fn put_proposal(w: &WriteTransaction<'_>, proposal: &Ballot) -> Result<(), StorageError> {
    if proposal.stage() != Stage::Proposal {
        return Err(StorageError::Encode(format!(
            "not a proposal: {}",
            proposal.stage()
        )));
    }
    let mut table = w.open_table(PROPOSALS).map_err(backend)?;
    let mut index = w.open_table(PROPOSAL_INDEX).map_err(backend)?;
    let fact = proposal.fact_hash().as_bytes();
    table
        .insert(fact, encode(proposal)?.as_slice())
        .map_err(backend)?;
    index
        .insert((proposal.height().0, proposal.round().0), fact)
        .map_err(backend)?;
    Ok(())
}

pub(crate) fn put_state(w: &WriteTransaction<'_>, state: &State) -> Result<(), StorageError> {
    let mut table = w.open_table(STATES).map_err(backend)?;
    table
        .insert(state.key(), encode(state)?.as_slice())
        .map_err(backend)?;
    Ok(())
}

/// Upserts the voteproof of `(height, stage)`. An existing one is replaced
/// only by a voteproof with strictly more votes. Returns whether it was
/// written.
pub(crate) fn put_voteproof(w: &WriteTransaction<'_>, vp: &Voteproof) -> Result<bool, StorageError> {
    let mut table = w.open_table(VOTEPROOFS).map_err(backend)?;
    let key = (vp.height().0, vp.stage().as_byte());
    let existing = table
        .get(key)
        .map_err(backend)?
        .map(|v| v.value().to_vec());
    if let Some(bytes) = existing {
        let current: Voteproof = decode(&bytes)?;
        if vp.votes().len() <= current.votes().len() {
            return Ok(false);
        }
    }
    table.insert(key, encode(vp)?.as_slice()).map_err(backend)?;
    Ok(true)
}

fn last_height(w: &WriteTransaction<'_>) -> Result<Option<(Height, Hash)>, StorageError> {
    let table = w.open_table(HEIGHTS).map_err(backend)?;
    let mut iter = table.iter().map_err(backend)?;
    let last = match iter.next_back() {
        Some(entry) => {
            let (k, v) = entry.map_err(backend)?;
            let hash = Hash::from_bytes(v.value().to_vec())
                .map_err(|e| StorageError::Decode(e.to_string()))?;
            Some((Height(k.value()), hash))
        }
        None => None,
    };
    Ok(last)
}

/// Writes every item of one block. The block must extend the stored head.
pub(crate) fn put_block(
    w: &WriteTransaction<'_>,
    block: &Block,
    map: Option<&BlockDataMap>,
) -> Result<(), StorageError> {
    let height = block.height();
    match last_height(w)? {
        Some((h, _)) if h >= height => {
            return Err(StorageError::Duplicated(format!("block at height {height}")));
        }
        Some((h, hash)) => {
            if h.next() != height || hash != *block.manifest.previous_block() {
                return Err(StorageError::Backend(format!(
                    "block {height} does not extend head {h}"
                )));
            }
        }
        None => {}
    }
    if let Some(map) = map {
        if map.height != height || map.block != *block.hash() {
            return Err(StorageError::Backend(format!(
                "block data map of {}/{} for block {height}",
                map.height, map.block
            )));
        }
    }

    let hash = block.hash().as_bytes();
    {
        let mut manifests = w.open_table(MANIFESTS).map_err(backend)?;
        manifests
            .insert(hash, encode(&block.manifest)?.as_slice())
            .map_err(backend)?;
        let mut heights = w.open_table(HEIGHTS).map_err(backend)?;
        heights.insert(height.0, hash).map_err(backend)?;
        let mut blocks = w.open_table(BLOCKS).map_err(backend)?;
        blocks
            .insert(hash, encode(block)?.as_slice())
            .map_err(backend)?;
        let mut operations = w.open_table(OPERATIONS).map_err(backend)?;
        for op in &block.operations {
            operations
                .insert(op.fact_hash().as_bytes(), height.0)
                .map_err(backend)?;
        }
        if let Some(map) = map {
            let mut maps = w.open_table(BLOCKDATA_MAPS).map_err(backend)?;
            maps.insert(height.0, encode(map)?.as_slice())
                .map_err(backend)?;
        }
    }
    for st in &block.states {
        put_state(w, st)?;
    }
    put_voteproof(w, &block.init_voteproof)?;
    put_voteproof(w, &block.accept_voteproof)?;
    put_proposal(w, &block.proposal)?;
    if let BallotFact::Proposal { seals, .. } = block.proposal.fact() {
        unstage(w, seals)?;
    }
    Ok(())
}

pub(crate) fn decode_manifest(bytes: &[u8]) -> Result<Manifest, StorageError> {
    decode(bytes)
}
