// Path: crates/storage/src/localfs/path.rs
//! Height-to-directory mapping.
//!
//! A height is printed as 21 characters, zero padded (underscore padded when
//! negative), and split into seven 3-character directories:
//! `block/000/000/000/000/000/000/012/`.

use isaac_types::app::{BlockDataType, Hash, Height};
use std::path::{Path, PathBuf};

pub(crate) const BLOCK_DIR: &str = "block";
pub(crate) const UNSTAGED_DIR: &str = "unstaged";
pub(crate) const REMOVED_FILE: &str = ".removed";
pub(crate) const FILE_EXT: &str = "jsonld.gz";

const HEIGHT_WIDTH: usize = 21;
const SEGMENT: usize = 3;
/// Directory levels below `block/`.
pub(crate) const DEPTH: usize = HEIGHT_WIDTH / SEGMENT;

pub(crate) fn height_text(height: Height) -> String {
    if height.0 < 0 {
        format!("{:_>width$}", height.0, width = HEIGHT_WIDTH)
    } else {
        format!("{:0>width$}", height.0, width = HEIGHT_WIDTH)
    }
}

/// `block/<h0>/<h1>/.../<h6>` relative to the root.
pub(crate) fn height_dir(height: Height) -> PathBuf {
    let text = height_text(height);
    let mut path = PathBuf::from(BLOCK_DIR);
    for chunk in text.as_bytes().chunks(SEGMENT) {
        path.push(String::from_utf8_lossy(chunk).as_ref());
    }
    path
}

/// Reverses [`height_dir`] from the seven segments below `block/`.
pub(crate) fn parse_height_dir(segments: &[String]) -> Option<Height> {
    if segments.len() != DEPTH {
        return None;
    }
    let text = segments.concat();
    text.trim_start_matches('_').parse::<i64>().ok().map(Height)
}

pub(crate) fn unstaged_dir(height: Height, block: &Hash) -> PathBuf {
    PathBuf::from(UNSTAGED_DIR).join(format!("{}-{}", height_text(height), block))
}

/// `<height>-<block>-<name>-<checksum>.jsonld.gz`
pub(crate) fn item_file_name(
    height: Height,
    block: &Hash,
    item: BlockDataType,
    checksum: &str,
) -> String {
    format!(
        "{}-{}-{}-{}.{}",
        height_text(height),
        block,
        item.as_str(),
        checksum,
        FILE_EXT
    )
}

/// Slash-separated relative path used in block data maps.
pub(crate) fn to_map_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
