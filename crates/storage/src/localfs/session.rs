// Path: crates/storage/src/localfs/session.rs
use super::path::{self, REMOVED_FILE};
use super::{blocking, fs_err, LocalFsBlockData};
use crate::metrics::metrics;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use isaac_api::blockdata::BlockDataSession;
use isaac_types::app::{Block, BlockDataMap, BlockDataMapItem, BlockDataType, Hash, Height};
use isaac_types::error::StorageError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Writes the artifacts of one block into `unstaged/<height>-<hash>/`.
#[derive(Debug)]
pub struct LocalFsSession {
    root: PathBuf,
    height: Height,
    block: Hash,
    unstaged: PathBuf,
    items: BTreeMap<BlockDataType, (String, String)>,
}

impl LocalFsSession {
    pub(crate) fn open(store: &LocalFsBlockData, height: Height, block: &Hash) -> Result<Self, StorageError> {
        let unstaged = store.root().join(path::unstaged_dir(height, block));
        if unstaged.exists() {
            fs::remove_dir_all(&unstaged).map_err(fs_err)?;
        }
        fs::create_dir_all(&unstaged).map_err(fs_err)?;
        Ok(Self {
            root: store.root().to_path_buf(),
            height,
            block: block.clone(),
            unstaged,
            items: BTreeMap::new(),
        })
    }
}

fn body_of(block: &Block, item: BlockDataType) -> Result<Vec<u8>, serde_json::Error> {
    match item {
        BlockDataType::Manifest => serde_json::to_vec(&block.manifest),
        BlockDataType::Operations => serde_json::to_vec(&block.operations),
        BlockDataType::OperationsTree => serde_json::to_vec(&block.operations_tree),
        BlockDataType::States => serde_json::to_vec(&block.states),
        BlockDataType::StatesTree => serde_json::to_vec(&block.states_tree),
        BlockDataType::InitVoteproof => serde_json::to_vec(&block.init_voteproof),
        BlockDataType::AcceptVoteproof => serde_json::to_vec(&block.accept_voteproof),
        BlockDataType::SuffrageInfo => serde_json::to_vec(&block.suffrage_info),
        BlockDataType::Proposal => serde_json::to_vec(&block.proposal),
    }
}

/// Hex SHA-256 of an uncompressed body.
pub(crate) fn checksum(body: &[u8]) -> String {
    hex::encode(Hash::sha256(body).as_bytes())
}

fn write_item(
    dir: &std::path::Path,
    height: Height,
    block: &Hash,
    item: BlockDataType,
    body: &[u8],
) -> Result<(String, String, u64), StorageError> {
    let sum = checksum(body);
    let name = path::item_file_name(height, block, item, &sum);
    let file = fs::File::create(dir.join(&name)).map_err(fs_err)?;
    let mut gz = GzEncoder::new(file, Compression::default());
    gz.write_all(body).map_err(fs_err)?;
    let file = gz.finish().map_err(fs_err)?;
    file.sync_all().map_err(fs_err)?;
    let written = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((sum, name, written))
}

#[async_trait]
impl BlockDataSession for LocalFsSession {
    fn height(&self) -> Height {
        self.height
    }

    async fn save_block(&mut self, block: &Block) -> Result<(), StorageError> {
        if block.height() != self.height || block.hash() != &self.block {
            return Err(StorageError::Fs(format!(
                "session for {}/{} got block {}/{}",
                self.height,
                self.block,
                block.height(),
                block.hash()
            )));
        }
        let mut bodies = Vec::with_capacity(BlockDataType::ALL.len());
        for item in BlockDataType::ALL {
            let body = body_of(block, item).map_err(|e| StorageError::Encode(e.to_string()))?;
            bodies.push((item, body));
        }

        let dir = self.unstaged.clone();
        let (height, hash) = (self.height, self.block.clone());
        let written = blocking(move || {
            let mut out = Vec::with_capacity(bodies.len());
            for (item, body) in bodies {
                let (sum, name, bytes) = write_item(&dir, height, &hash, item, &body)?;
                out.push((item, sum, name, bytes));
            }
            Ok(out)
        })
        .await?;

        let mut total = 0;
        for (item, sum, name, bytes) in written {
            self.items.insert(item, (sum, name));
            total += bytes;
        }
        metrics().inc_bytes_written_total(total);
        Ok(())
    }

    async fn done(self: Box<Self>) -> Result<BlockDataMap, StorageError> {
        let Self {
            root,
            height,
            block,
            unstaged,
            items,
        } = *self;
        let relative = path::height_dir(height);
        let mut map = BlockDataMap::new(height, block.clone());
        for (item, (sum, name)) in items {
            map.items.insert(
                item,
                BlockDataMapItem {
                    checksum: sum,
                    path: path::to_map_path(&relative.join(name)),
                },
            );
        }
        if !map.is_complete() {
            return Err(StorageError::NotFound(format!(
                "block data of {height}/{block} is incomplete"
            )));
        }

        let target = root.join(&relative);
        blocking(move || {
            if target.exists() {
                if !target.join(REMOVED_FILE).exists() {
                    return Err(StorageError::Duplicated(format!(
                        "block data at height {height}"
                    )));
                }
                fs::remove_dir_all(&target).map_err(fs_err)?;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(fs_err)?;
            }
            fs::rename(&unstaged, &target).map_err(fs_err)
        })
        .await?;
        tracing::debug!(
            target: "blockdata",
            height = map.height.0,
            block = %map.block,
            "block data moved into place"
        );
        Ok(map)
    }

    async fn cancel(self: Box<Self>) -> Result<(), StorageError> {
        let unstaged = self.unstaged.clone();
        blocking(move || {
            if unstaged.exists() {
                fs::remove_dir_all(&unstaged).map_err(fs_err)?;
            }
            Ok(())
        })
        .await
    }
}
