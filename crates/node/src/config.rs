// Path: crates/node/src/config.rs
//! Loading node configuration files.

use anyhow::{Context, Result};
use isaac_types::config::NodeConfig;
use std::fs;
use std::path::Path;

/// Reads and validates the TOML configuration at `path`.
pub fn load(path: &Path) -> Result<NodeConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: NodeConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Loads every configuration and rejects duplicate node addresses.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<NodeConfig>> {
    let mut configs: Vec<NodeConfig> = Vec::with_capacity(paths.len());
    for path in paths {
        let config = load(path.as_ref())?;
        if configs.iter().any(|c| c.address == config.address) {
            anyhow::bail!("node {} is configured twice", config.address);
        }
        configs.push(config);
    }
    Ok(configs)
}

/// Creates the parent directories of the storage paths.
pub fn prepare_storage(config: &NodeConfig) -> Result<()> {
    if let Some(parent) = config.storage.database.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::create_dir_all(&config.storage.blockdata).with_context(|| {
        format!("failed to create {}", config.storage.blockdata.display())
    })?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use isaac_test_utils::fixtures::{self, TestNode};

    pub(crate) fn write(dir: &Path, node: &TestNode) -> std::path::PathBuf {
        let path = dir.join(format!("{}.toml", node.address));
        let raw = format!(
            r#"
network_id = "isaac-test-network"
address = "{address}"
privatekey = "{key}"

[storage]
database = "{dir}/{address}/isaac.redb"
blockdata = "{dir}/{address}/blockdata"

[suffrage]
type = "fixed-proposer"
proposer = "{address}"
"#,
            address = node.address,
            key = node.key.to_text().unwrap(),
            dir = dir.display(),
        );
        fs::write(&path, raw).unwrap();
        path
    }

    #[test]
    fn test_load_and_prepare() {
        let dir = fixtures::tempdir();
        let node = TestNode::new("n0");
        let config = load(&write(dir.path(), &node)).unwrap();
        assert_eq!(config.address, node.address);
        assert_eq!(config.privatekey().unwrap().publickey(), node.publickey());

        prepare_storage(&config).unwrap();
        assert!(dir.path().join("n0").is_dir());
        assert!(config.storage.blockdata.is_dir());
    }

    #[test]
    fn test_duplicate_address_is_rejected() {
        let dir = fixtures::tempdir();
        let path = write(dir.path(), &TestNode::new("n0"));
        let err = load_all(&[path.clone(), path]).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_missing_file() {
        let dir = fixtures::tempdir();
        let err = load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
