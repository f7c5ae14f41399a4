// Path: crates/storage/src/localfs/mod.rs
//! Block artifacts on the local filesystem.
//!
//! Each artifact is a gzip-compressed JSON file stored under
//! `block/<height segments>/`. Sessions write into `unstaged/` and move the
//! whole directory into place. Removing a height only drops a `.removed`
//! marker next to the files; [`LocalFsBlockData::spawn_cleaner`] deletes
//! marked heights once they are older than `remove_after`.

mod path;
mod session;

pub use session::LocalFsSession;

use crate::metrics::metrics;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use isaac_api::blockdata::{BlockData, BlockDataSession};
use isaac_types::app::{Block, BlockDataMap, BlockDataType, Hash, Height};
use isaac_types::error::StorageError;
use path::{BLOCK_DIR, DEPTH, REMOVED_FILE, UNSTAGED_DIR};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

pub(crate) fn fs_err(e: std::io::Error) -> StorageError {
    StorageError::Fs(e.to_string())
}

pub(crate) async fn blocking<F, T>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Fs(e.to_string()))?
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The filesystem block artifact store.
#[derive(Debug, Clone)]
pub struct LocalFsBlockData {
    root: PathBuf,
    remove_after: Duration,
}

impl LocalFsBlockData {
    /// Opens the store at `root`, creating its directories and dropping
    /// sessions left behind by a previous run.
    pub fn open<P: AsRef<Path>>(root: P, remove_after: Duration) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BLOCK_DIR)).map_err(fs_err)?;
        let unstaged = root.join(UNSTAGED_DIR);
        if unstaged.exists() {
            fs::remove_dir_all(&unstaged).map_err(fs_err)?;
        }
        fs::create_dir_all(&unstaged).map_err(fs_err)?;
        tracing::debug!(target: "blockdata", root = %root.display(), "block data opened");
        Ok(Self { root, remove_after })
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_of(&self, height: Height) -> PathBuf {
        self.root.join(path::height_dir(height))
    }

    fn is_live(dir: &Path) -> bool {
        dir.is_dir() && !dir.join(REMOVED_FILE).exists()
    }

    /// Every stored height directory, sorted by height.
    fn height_dirs(&self) -> Result<Vec<(Height, PathBuf)>, StorageError> {
        let mut out = Vec::new();
        walk(
            &self.root.join(BLOCK_DIR),
            &mut Vec::with_capacity(DEPTH),
            &mut out,
        )?;
        out.sort_by_key(|(h, _)| *h);
        Ok(out)
    }

    fn mark_removed(dir: &Path) -> Result<(), StorageError> {
        fs::write(dir.join(REMOVED_FILE), unix_now().to_string()).map_err(fs_err)
    }

    /// Deletes every height marked removed at least `remove_after` ago.
    /// Returns the number of heights deleted.
    pub fn clean_removed(&self) -> Result<usize, StorageError> {
        let now = unix_now();
        let mut purged = 0;
        for (height, dir) in self.height_dirs()? {
            let marker = dir.join(REMOVED_FILE);
            if !marker.exists() {
                continue;
            }
            let marked_at = fs::read_to_string(&marker)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0);
            if now.saturating_sub(marked_at) < self.remove_after.as_secs() {
                continue;
            }
            fs::remove_dir_all(&dir).map_err(fs_err)?;
            tracing::debug!(target: "blockdata", height = height.0, "removed block data purged");
            purged += 1;
        }
        Ok(purged)
    }

    /// Runs [`Self::clean_removed`] every `interval` until the task is
    /// aborted.
    pub fn spawn_cleaner(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let s = store.clone();
                match blocking(move || s.clean_removed()).await {
                    Ok(0) => {}
                    Ok(n) => {
                        metrics().inc_blockdata_purged(n as u64);
                        tracing::info!(
                            target: "blockdata",
                            event = "blockdata_purged",
                            count = n,
                            "removed block data purged"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(target: "blockdata", error = %e, "block data cleaner failed")
                    }
                }
            }
        })
    }
}

fn walk(
    dir: &Path,
    segments: &mut Vec<String>,
    out: &mut Vec<(Height, PathBuf)>,
) -> Result<(), StorageError> {
    if segments.len() == DEPTH {
        if let Some(h) = path::parse_height_dir(segments) {
            out.push((h, dir.to_path_buf()));
        }
        return Ok(());
    }
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).map_err(fs_err)? {
        let entry = entry.map_err(fs_err)?;
        if !entry.file_type().map_err(fs_err)?.is_dir() {
            continue;
        }
        segments.push(entry.file_name().to_string_lossy().into_owned());
        walk(&entry.path(), segments, out)?;
        segments.pop();
    }
    Ok(())
}

fn read_checked(root: &Path, map: &BlockDataMap, item: BlockDataType) -> Result<Vec<u8>, StorageError> {
    let entry = map
        .items
        .get(&item)
        .ok_or_else(|| StorageError::NotFound(format!("{} of height {}", item.as_str(), map.height)))?;
    let file = fs::File::open(root.join(&entry.path)).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(entry.path.clone()),
        _ => fs_err(e),
    })?;
    let mut body = Vec::new();
    GzDecoder::new(file).read_to_end(&mut body).map_err(fs_err)?;
    let sum = session::checksum(&body);
    if sum != entry.checksum {
        return Err(StorageError::Checksum(format!(
            "{}: expected {}, got {sum}",
            entry.path, entry.checksum
        )));
    }
    Ok(body)
}

fn parse<T: DeserializeOwned>(item: BlockDataType, body: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(body).map_err(|e| StorageError::Decode(format!("{}: {e}", item.as_str())))
}

#[async_trait]
impl BlockData for LocalFsBlockData {
    async fn new_session(
        &self,
        height: Height,
        block: &Hash,
    ) -> Result<Box<dyn BlockDataSession>, StorageError> {
        let store = self.clone();
        let block = block.clone();
        let session = blocking(move || LocalFsSession::open(&store, height, &block)).await?;
        Ok(Box::new(session))
    }

    async fn exists(&self, height: Height) -> Result<bool, StorageError> {
        Ok(Self::is_live(&self.dir_of(height)))
    }

    async fn remove(&self, height: Height) -> Result<bool, StorageError> {
        let dir = self.dir_of(height);
        if !Self::is_live(&dir) {
            return Ok(false);
        }
        Self::mark_removed(&dir)?;
        Ok(true)
    }

    async fn remove_all(&self, height: Height) -> Result<bool, StorageError> {
        let dir = self.dir_of(height);
        if !dir.is_dir() {
            return Ok(false);
        }
        blocking(move || fs::remove_dir_all(&dir).map_err(fs_err)).await?;
        Ok(true)
    }

    async fn remove_above(&self, height: Height) -> Result<Vec<Height>, StorageError> {
        let store = self.clone();
        let removed = blocking(move || {
            let mut removed = Vec::new();
            for (h, dir) in store.height_dirs()? {
                if h > height && Self::is_live(&dir) {
                    Self::mark_removed(&dir)?;
                    removed.push(h);
                }
            }
            Ok(removed)
        })
        .await?;
        if !removed.is_empty() {
            tracing::info!(
                target: "blockdata",
                above = height.0,
                count = removed.len(),
                "block data above height marked removed"
            );
        }
        Ok(removed)
    }

    async fn read_item(
        &self,
        map: &BlockDataMap,
        item: BlockDataType,
    ) -> Result<Vec<u8>, StorageError> {
        let root = self.root.clone();
        let map = map.clone();
        blocking(move || read_checked(&root, &map, item)).await
    }

    async fn load_block(&self, map: &BlockDataMap) -> Result<Block, StorageError> {
        let root = self.root.clone();
        let map = map.clone();
        blocking(move || {
            let read = |item| read_checked(&root, &map, item).map(|b| (item, b));
            let (i, b) = read(BlockDataType::Manifest)?;
            let manifest = parse(i, &b)?;
            let (i, b) = read(BlockDataType::Operations)?;
            let operations = parse(i, &b)?;
            let (i, b) = read(BlockDataType::OperationsTree)?;
            let operations_tree = parse(i, &b)?;
            let (i, b) = read(BlockDataType::States)?;
            let states = parse(i, &b)?;
            let (i, b) = read(BlockDataType::StatesTree)?;
            let states_tree = parse(i, &b)?;
            let (i, b) = read(BlockDataType::InitVoteproof)?;
            let init_voteproof = parse(i, &b)?;
            let (i, b) = read(BlockDataType::AcceptVoteproof)?;
            let accept_voteproof = parse(i, &b)?;
            let (i, b) = read(BlockDataType::SuffrageInfo)?;
            let suffrage_info = parse(i, &b)?;
            let (i, b) = read(BlockDataType::Proposal)?;
            let proposal = parse(i, &b)?;

            let block = Block {
                manifest,
                operations,
                operations_tree,
                states,
                states_tree,
                init_voteproof,
                accept_voteproof,
                suffrage_info,
                proposal,
            };
            if block.height() != map.height || *block.hash() != map.block {
                return Err(StorageError::Decode(format!(
                    "block data map {}/{} holds block {}/{}",
                    map.height,
                    map.block,
                    block.height(),
                    block.hash()
                )));
            }
            Ok(block)
        })
        .await
    }

    async fn clean(&self) -> Result<(), StorageError> {
        let root = self.root.clone();
        blocking(move || {
            for dir in [BLOCK_DIR, UNSTAGED_DIR] {
                let p = root.join(dir);
                if p.exists() {
                    fs::remove_dir_all(&p).map_err(fs_err)?;
                }
                fs::create_dir_all(&p).map_err(fs_err)?;
            }
            Ok(())
        })
        .await?;
        tracing::info!(target: "blockdata", event = "blockdata_cleaned", "block data cleaned");
        Ok(())
    }
}
