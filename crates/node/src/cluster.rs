// Path: crates/node/src/cluster.rs
//! Runs one or more configured nodes inside a single process.
//!
//! Nodes are connected through a [`LocalNetwork`]: each node gets a channel
//! to every other local node it knows by key.

use crate::config::prepare_storage;
use anyhow::{Context, Result};
use futures::future::select_all;
use isaac_api::consensus::StateKind;
use isaac_consensus::Node;
use isaac_networking::{ChannelHandler, LocalNetwork};
use isaac_storage::{LocalFsBlockData, RedbDatabase};
use isaac_telemetry::http::{Health, HealthCheck};
use isaac_types::app::Address;
use isaac_types::config::NodeConfig;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(5);

/// How a cluster run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Interrupted by the operator.
    Interrupted,
    /// A node entered BROKEN.
    Broken(Address),
}

pub struct LocalCluster {
    network: LocalNetwork,
    nodes: Vec<Arc<Node>>,
    cleaners: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Opens storage and builds a node for every configuration.
    pub fn build(configs: &[NodeConfig]) -> Result<Self> {
        let network = LocalNetwork::new();
        let mut nodes = Vec::with_capacity(configs.len());
        let mut cleaners = Vec::with_capacity(configs.len());
        for config in configs {
            prepare_storage(config)?;
            let database = RedbDatabase::open(&config.storage.database, config.storage.exec_timeout)
                .with_context(|| format!("failed to open database of {}", config.address))?;
            let blockdata = LocalFsBlockData::open(
                &config.storage.blockdata,
                config.storage.blockdata_remove_after,
            )
            .with_context(|| format!("failed to open block data of {}", config.address))?;
            cleaners.push(blockdata.spawn_cleaner(config.storage.blockdata_clean_interval));

            let node = Node::new(config, Arc::new(database), Arc::new(blockdata))
                .with_context(|| format!("failed to build node {}", config.address))?;
            let handler: Weak<dyn ChannelHandler> = Arc::downgrade(&node) as _;
            network.register(config.address.clone(), handler);
            nodes.push(node);
        }

        for (config, node) in configs.iter().zip(&nodes) {
            for peer in &config.nodes {
                if !nodes.iter().any(|n| *n.address() == peer.address) {
                    tracing::warn!(target: "node", node = %config.address, peer = %peer.address, "peer is not part of this process");
                    continue;
                }
                let channel =
                    network.channel(config.address.clone(), peer.address.clone(), CHANNEL_TIMEOUT);
                node.nodepool().add(
                    peer.address.clone(),
                    peer.publickey.clone(),
                    Some(Arc::new(channel)),
                );
            }
        }

        Ok(Self {
            network,
            nodes,
            cleaners,
        })
    }

    pub fn start(&self) {
        for node in &self.nodes {
            node.start();
        }
    }

    /// Healthy while no local node is BROKEN.
    pub fn health(&self) -> HealthCheck {
        let nodes = self.nodes.clone();
        Arc::new(move || {
            let states: Vec<_> = nodes.iter().map(|n| (n.address().clone(), n.state())).collect();
            Health {
                healthy: states.iter().all(|(_, s)| *s != StateKind::Broken),
                detail: states
                    .iter()
                    .map(|(address, state)| format!("{address} {state}\n"))
                    .collect(),
            }
        })
    }

    /// Waits for CTRL+C or for any node to break.
    pub async fn wait(&self) -> Exit {
        let broken = select_all(self.nodes.iter().map(|node| {
            let mut state = node.subscribe_state();
            let address = node.address().clone();
            Box::pin(async move {
                match state.wait_for(|s| *s == StateKind::Broken).await {
                    Ok(_) => Some(address),
                    Err(_) => None,
                }
            })
        }));
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(target: "node", error = %e, "failed to listen for CTRL+C");
                }
                Exit::Interrupted
            }
            (address, _, _) = broken => match address {
                Some(address) => Exit::Broken(address),
                None => Exit::Interrupted,
            },
        }
    }

    pub async fn stop(self) {
        for node in &self.nodes {
            node.stop().await;
            self.network.unregister(node.address());
        }
        for cleaner in self.cleaners {
            cleaner.abort();
        }
    }
}
