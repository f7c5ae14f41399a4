// Path: crates/consensus/tests/common/mod.rs
//! In-process clusters for the end-to-end tests.

#![allow(dead_code)]

use isaac_api::consensus::StateKind;
use isaac_api::storage::Database;
use isaac_consensus::Node;
use isaac_networking::{ChannelHandler, LocalNetwork};
use isaac_storage::{LocalFsBlockData, RedbDatabase};
use isaac_test_utils::fixtures::{self, TestNode};
use isaac_types::app::{Address, Block, Height, Manifest};
use isaac_types::config::{
    ErrorPoints, GenesisOperation, NodeConfig, NodeEntry, Policy, StorageConfig, SuffrageConfig,
    SuffrageKind,
};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tempfile::TempDir;

pub const CHANNEL_TIMEOUT: Duration = Duration::from_secs(2);

pub fn roundrobin(nodes: &[TestNode]) -> SuffrageConfig {
    SuffrageConfig {
        kind: SuffrageKind::Roundrobin,
        proposer: None,
        nodes: nodes.iter().map(|n| n.address.clone()).collect(),
    }
}

pub fn fixed(proposer: &TestNode, nodes: &[TestNode]) -> SuffrageConfig {
    SuffrageConfig {
        kind: SuffrageKind::FixedProposer,
        proposer: Some(proposer.address.clone()),
        nodes: nodes.iter().map(|n| n.address.clone()).collect(),
    }
}

/// The configuration of `me` knowing every node of `known`.
pub fn config(
    dir: &Path,
    me: &TestNode,
    known: &[TestNode],
    suffrage: SuffrageConfig,
    policy: Policy,
) -> NodeConfig {
    NodeConfig {
        network_id: String::from_utf8_lossy(fixtures::NETWORK_ID).into_owned(),
        address: me.address.clone(),
        privatekey: me.key.to_text().unwrap(),
        storage: StorageConfig {
            database: dir.join(format!("{}.redb", me.address)),
            blockdata: dir.join(format!("{}-blockdata", me.address)),
            ..StorageConfig::default()
        },
        policy,
        suffrage,
        nodes: known
            .iter()
            .filter(|n| n.address != me.address)
            .map(|n| NodeEntry {
                address: n.address.clone(),
                publickey: n.publickey(),
            })
            .collect(),
        genesis_operations: Vec::<GenesisOperation>::new(),
        error_points: ErrorPoints::default(),
        telemetry_addr: None,
    }
}

pub struct Member {
    pub test: TestNode,
    pub node: Arc<Node>,
    pub db: Arc<RedbDatabase>,
    pub blockdata: Arc<LocalFsBlockData>,
}

impl Member {
    pub fn address(&self) -> &Address {
        &self.test.address
    }
}

pub struct Cluster {
    pub dir: TempDir,
    pub network: LocalNetwork,
    pub members: Vec<Member>,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            dir: fixtures::tempdir(),
            network: LocalNetwork::new(),
            members: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens storage for `config`, builds the node and connects it to every
    /// member both ways. The node is not started.
    pub fn add(&mut self, test: TestNode, config: NodeConfig) -> &Member {
        self.add_with(test, config, |db| db)
    }

    /// Like [`Cluster::add`], but the node talks to the database `wrap` returns.
    pub fn add_with<W>(&mut self, test: TestNode, config: NodeConfig, wrap: W) -> &Member
    where
        W: FnOnce(Arc<RedbDatabase>) -> Arc<dyn Database>,
    {
        let db = Arc::new(RedbDatabase::open(&config.storage.database, CHANNEL_TIMEOUT).unwrap());
        let blockdata = Arc::new(
            LocalFsBlockData::open(&config.storage.blockdata, config.storage.blockdata_remove_after)
                .unwrap(),
        );
        let node = Node::new(&config, wrap(db.clone()), blockdata.clone()).unwrap();
        let member = Member {
            test,
            node,
            db,
            blockdata,
        };
        self.attach(&member);
        self.members.push(member);
        self.members.last().unwrap()
    }

    /// Registers `member` on the network and wires channels between it and
    /// every other member.
    pub fn attach(&self, member: &Member) {
        let handler: Weak<dyn ChannelHandler> = Arc::downgrade(&member.node) as _;
        self.network.register(member.address().clone(), handler);
        for other in &self.members {
            if other.address() == member.address() {
                continue;
            }
            self.connect(member, other);
            self.connect(other, member);
        }
    }

    fn connect(&self, from: &Member, to: &Member) {
        let channel = self
            .network
            .channel(from.address().clone(), to.address().clone(), CHANNEL_TIMEOUT);
        from.node
            .nodepool()
            .add(to.address().clone(), to.test.publickey(), Some(Arc::new(channel)));
    }

    pub fn start(&self) {
        for m in &self.members {
            m.node.start();
        }
    }

    pub async fn stop(&self) {
        for m in &self.members {
            m.node.stop().await;
        }
    }
}

/// Polls `check` until it holds. Panics after `timeout`.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub async fn head(db: &dyn Database) -> Height {
    db.last_manifest()
        .await
        .unwrap()
        .map(|m| m.height())
        .unwrap_or(Height::NIL)
}

pub async fn wait_height(member: &Member, height: Height, timeout: Duration) -> Manifest {
    let db = member.db.clone();
    wait_for(
        &format!("{} at height {height}", member.address()),
        timeout,
        || {
            let db = db.clone();
            async move { head(db.as_ref()).await >= height }
        },
    )
    .await;
    member.db.manifest_by_height(height).await.unwrap().unwrap()
}

pub async fn wait_state(member: &Member, state: StateKind, timeout: Duration) {
    let mut rx = member.node.subscribe_state();
    let result = tokio::time::timeout(timeout, rx.wait_for(|s| *s == state)).await;
    assert!(
        matches!(result, Ok(Ok(_))),
        "{} never reached {state}, last {}",
        member.address(),
        member.node.state()
    );
}

pub async fn block(member: &Member, height: Height) -> Block {
    member.db.block_by_height(height).await.unwrap().unwrap()
}
