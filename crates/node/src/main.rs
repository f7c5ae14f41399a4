// Path: crates/node/src/main.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

mod cluster;
mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cluster::{Exit, LocalCluster};
use isaac_api::blockdata::BlockData;
use isaac_api::storage::Database;
use isaac_consensus::{GenesisGenerator, LocalNode};
use isaac_crypto::sign::{KeyKind, Privatekey};
use isaac_storage::{LocalFsBlockData, RedbDatabase};
use isaac_telemetry::http::HealthCheck;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Exit code of a startup failure.
const EXIT_STARTUP: u8 = 1;
/// Exit code when a node broke.
const EXIT_BROKEN: u8 = 2;

#[derive(Parser, Debug)]
#[clap(name = "isaac-node", about = "ISAAC consensus node", version)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints a new key pair as TOML.
    Keygen {
        /// Key kind: btc, ether or stellar.
        #[clap(long, default_value = "btc")]
        kind: KeyKind,
    },
    /// Wipes the storage of a node and creates its genesis block.
    Init {
        /// Node configuration file.
        config: PathBuf,
    },
    /// Runs the configured nodes in this process until CTRL+C.
    Run {
        /// Node configuration files.
        #[clap(required = true, env = "ISAAC_CONFIG", value_delimiter = ',')]
        configs: Vec<PathBuf>,
    },
}

#[derive(Serialize)]
struct KeyPair {
    privatekey: String,
    publickey: String,
}

fn keygen(kind: KeyKind) -> Result<()> {
    let key = Privatekey::generate(kind);
    let pair = KeyPair {
        privatekey: key.to_text()?,
        publickey: key.publickey().to_string(),
    };
    print!("{}", toml::to_string(&pair)?);
    Ok(())
}

async fn init(path: PathBuf) -> Result<()> {
    let config = config::load(&path)?;
    config::prepare_storage(&config)?;
    let database = Arc::new(
        RedbDatabase::open(&config.storage.database, config.storage.exec_timeout)
            .context("failed to open database")?,
    );
    let blockdata = Arc::new(
        LocalFsBlockData::open(&config.storage.blockdata, config.storage.blockdata_remove_after)
            .context("failed to open block data")?,
    );
    database.clean().await?;
    blockdata.clean().await?;

    let local = Arc::new(LocalNode::new(
        config.address.clone(),
        config.privatekey()?,
        config.network_id.as_bytes(),
    ));
    let block = GenesisGenerator::new(local, database, blockdata, &config.genesis_operations)?
        .generate()
        .await?;
    tracing::info!(
        target: "node",
        event = "genesis_created",
        height = block.height().0,
        block = %block.hash(),
        "genesis block created"
    );
    Ok(())
}

fn install_telemetry(
    addr: &str,
    health: HealthCheck,
    shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid telemetry_addr {addr}"))?;
    let sink = isaac_telemetry::prometheus::install()?;
    isaac_telemetry::sinks::SINK
        .set(sink)
        .map_err(|_| anyhow!("metrics sink already installed"))?;
    tokio::spawn(isaac_telemetry::http::run_server(addr, health, async move {
        let _ = shutdown.await;
    }));
    Ok(())
}

async fn run(paths: Vec<PathBuf>) -> Result<Exit> {
    let configs = config::load_all(&paths)?;
    let cluster = LocalCluster::build(&configs)?;
    let (stop_telemetry, telemetry_stopped) = oneshot::channel();
    if let Some(addr) = configs.iter().find_map(|c| c.telemetry_addr.as_deref()) {
        install_telemetry(addr, cluster.health(), telemetry_stopped)?;
    }
    cluster.start();
    let exit = cluster.wait().await;
    tracing::info!(target: "node", exit = ?exit, "stopping");
    cluster.stop().await;
    let _ = stop_telemetry.send(());
    Ok(exit)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = isaac_telemetry::init::init_tracing() {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::from(EXIT_STARTUP);
    }
    let opts = Opts::parse();

    let result = match opts.command {
        Command::Keygen { kind } => keygen(kind).map(|_| None),
        Command::Init { config } => init(config).await.map(|_| None),
        Command::Run { configs } => run(configs).await.map(Some),
    };
    match result {
        Ok(Some(Exit::Broken(address))) => {
            tracing::error!(target: "node", node = %address, "node is broken");
            ExitCode::from(EXIT_BROKEN)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(target: "node", error = %format!("{e:#}"), "startup failed");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_with_many_configs() {
        let opts = Opts::try_parse_from(["isaac-node", "run", "a.toml", "b.toml"]).unwrap();
        match opts.command {
            Command::Run { configs } => {
                assert_eq!(configs, vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_keygen_kind() {
        let opts = Opts::try_parse_from(["isaac-node", "keygen", "--kind", "stellar"]).unwrap();
        assert!(matches!(
            opts.command,
            Command::Keygen {
                kind: KeyKind::Stellar
            }
        ));
    }

    #[tokio::test]
    async fn test_init_creates_genesis() {
        let dir = isaac_test_utils::fixtures::tempdir();
        let node = isaac_test_utils::fixtures::TestNode::new("n0");
        let path = dir.path().join("n0.toml");
        let raw = format!(
            "network_id = \"isaac-test-network\"\naddress = \"n0\"\nprivatekey = \"{}\"\n\n[storage]\ndatabase = \"{}/db.redb\"\nblockdata = \"{}/blockdata\"\n\n[suffrage]\ntype = \"fixed-proposer\"\nproposer = \"n0\"\n",
            node.key.to_text().unwrap(),
            dir.path().display(),
            dir.path().display(),
        );
        std::fs::write(&path, raw).unwrap();

        isaac_test_utils::assert_ok!(init(path.clone()).await);
        let database = RedbDatabase::open(dir.path().join("db.redb"), std::time::Duration::from_secs(2)).unwrap();
        let genesis = database.last_manifest().await.unwrap().unwrap();
        assert_eq!(genesis.height(), isaac_types::app::Height::GENESIS);
    }
}
