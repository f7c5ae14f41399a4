// Path: crates/consensus/tests/cluster.rs
//! End-to-end runs of in-process clusters over the local network.

mod common;

use common::{block, config, fixed, roundrobin, wait_for, wait_height, wait_state, Cluster};
use isaac_api::blockdata::BlockData;
use isaac_api::consensus::StateKind;
use isaac_api::state::StateReader;
use async_trait::async_trait;
use isaac_api::storage::{BlockStorage, Database, SealOrder, SyncerStorage};
use isaac_consensus::Node;
use isaac_networking::ChannelHandler;
use isaac_storage::RedbDatabase;
use isaac_test_utils::assertions::{assert_chained, assert_majority_without};
use isaac_test_utils::fixtures::{self, TestNode};
use isaac_types::app::{
    Ballot, BallotFact, Block, BlockDataMap, Hash, Height, Manifest, OperationFact, OperationSeal,
    Round, Seal, Stage, State, Value, Voteproof,
};
use isaac_types::config::{ErrorPoint, ErrorPointKind, GenesisOperation};
use isaac_types::error::StorageError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(30);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node_creates_genesis_and_keeps_going() {
    let mut cluster = Cluster::new();
    let n0 = TestNode::new("n0");
    let mut cfg = config(
        cluster.path(),
        &n0,
        &[],
        fixed(&n0, &[n0.clone()]),
        fixtures::policy(100.0, 1),
    );
    cfg.genesis_operations.push(GenesisOperation {
        key: "greeting".into(),
        value: b"hello".to_vec(),
    });
    cluster.add(n0, cfg);
    cluster.start();

    let member = &cluster.members[0];
    let genesis = wait_height(member, Height::GENESIS, WAIT).await;
    assert_eq!(genesis.previous_block(), &fixtures::genesis_previous_block());
    let state = member.db.state("greeting").await.unwrap().unwrap();
    assert_eq!(state.value(), Some(&Value::bytes(b"hello".to_vec())));
    let genesis_block = block(member, Height::GENESIS).await;
    assert_eq!(genesis_block.states.len(), 1);
    assert!(genesis_block.init_voteproof.is_majority());
    assert!(genesis_block.accept_voteproof.is_majority());

    wait_state(member, StateKind::Consensus, WAIT).await;
    let third = wait_height(member, Height(3), WAIT).await;
    let second = member.db.manifest_by_height(Height(2)).await.unwrap().unwrap();
    assert_chained(&second, &third);
    assert!(member.blockdata.exists(Height(3)).await.unwrap());

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_nodes_agree_on_submitted_operation() {
    let mut cluster = Cluster::new();
    let nodes = TestNode::many(3);
    for n in &nodes {
        let cfg = config(
            cluster.path(),
            n,
            &nodes,
            roundrobin(&nodes),
            fixtures::policy(67.0, 3),
        );
        cluster.add(n.clone(), cfg);
    }
    cluster.start();

    for m in &cluster.members {
        wait_state(m, StateKind::Consensus, WAIT).await;
    }

    let seal = cluster.members[1]
        .node
        .submit(vec![OperationFact::key_value("x", vec![2u8])])
        .await
        .unwrap();
    let fact = seal.operations()[0].fact_hash().clone();

    for m in &cluster.members {
        let db = m.db.clone();
        let fact = fact.clone();
        wait_for("operation in a block", WAIT, || {
            let db = db.clone();
            let fact = fact.clone();
            async move { db.has_operation(&fact).await.unwrap() }
        })
        .await;
    }

    let state = cluster.members[0].db.state("x").await.unwrap().unwrap();
    let height = state.height();
    let reference = block(&cluster.members[0], height).await;
    assert!(reference.operations.iter().any(|op| op.fact_hash() == &fact));
    assert!(reference.manifest.round() <= Round(1));
    for m in &cluster.members[1..] {
        let other = block(m, height).await;
        assert_eq!(other.hash(), reference.hash());
        assert_eq!(other.manifest.states_root(), reference.manifest.states_root());
    }

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_proposer_moves_to_next_round() {
    let mut cluster = Cluster::new();
    let nodes = TestNode::many(4);
    // n1 proposes (1, 0) and never comes up.
    for n in nodes.iter().filter(|n| n.address.as_str() != "n1") {
        let cfg = config(
            cluster.path(),
            n,
            &nodes,
            roundrobin(&nodes),
            fixtures::policy(67.0, 4),
        );
        cluster.add(n.clone(), cfg);
    }
    cluster.start();

    let reference = wait_height(&cluster.members[0], Height(1), WAIT).await;
    assert_eq!(reference.round(), Round(1));
    for m in &cluster.members[1..] {
        let manifest = wait_height(m, Height(1), WAIT).await;
        assert_eq!(manifest.hash(), reference.hash());
    }
    let committed = block(&cluster.members[0], Height(1)).await;
    assert_eq!(committed.suffrage_info.proposer.as_str(), "n2");

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_equivocating_node_is_excluded() {
    let mut cluster = Cluster::new();
    let nodes = TestNode::many(4);
    let byzantine = nodes[3].clone();
    for n in &nodes[..3] {
        let cfg = config(
            cluster.path(),
            n,
            &nodes,
            roundrobin(&nodes),
            fixtures::policy(67.0, 4),
        );
        cluster.add(n.clone(), cfg);
    }

    // Two different INIT ballots for the same (height, round).
    let conflicting: Vec<Seal> = [b"one".as_slice(), b"two".as_slice()]
        .into_iter()
        .map(|seed| {
            byzantine
                .ballot(
                    BallotFact::Init {
                        height: Height(1),
                        round: Round::ZERO,
                        previous_block: Hash::sha256(seed),
                    },
                    None,
                )
                .into()
        })
        .collect();
    for m in &cluster.members {
        for seal in &conflicting {
            m.node
                .handle_seal(&byzantine.address, seal.clone())
                .await
                .unwrap();
        }
    }
    cluster.start();

    for m in &cluster.members {
        wait_height(m, Height(1), WAIT).await;
        let init = m
            .db
            .voteproof(Height(1), Stage::Init)
            .await
            .unwrap()
            .unwrap();
        assert_majority_without(&init, &[&byzantine.address]);
    }

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_node_syncs_and_follows() {
    let mut cluster = Cluster::new();
    let nodes = TestNode::many(4);
    let (suffrage, late) = nodes.split_at(3);
    for n in suffrage {
        let cfg = config(
            cluster.path(),
            n,
            &nodes,
            roundrobin(suffrage),
            fixtures::policy(67.0, 3),
        );
        cluster.add(n.clone(), cfg);
    }
    cluster.start();
    wait_height(&cluster.members[0], Height(20), Duration::from_secs(60)).await;

    let late = late[0].clone();
    let cfg = config(
        cluster.path(),
        &late,
        &nodes,
        roundrobin(suffrage),
        fixtures::policy(67.0, 3),
    );
    cluster.add(late, cfg).node.start();
    let follower = &cluster.members[3];

    wait_state(follower, StateKind::Consensus, Duration::from_secs(60)).await;
    let target = common::head(cluster.members[0].db.as_ref()).await.next();
    let followed = wait_height(follower, target, WAIT).await;
    let reference = wait_height(&cluster.members[0], target, WAIT).await;
    assert_eq!(followed.hash(), reference.hash());
    assert_eq!(
        block(follower, Height(20)).await.hash(),
        block(&cluster.members[0], Height(20)).await.hash()
    );

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_drops_uncommitted_block_data() {
    let mut cluster = Cluster::new();
    let n0 = TestNode::new("n0");
    let cfg = config(
        cluster.path(),
        &n0,
        &[],
        fixed(&n0, &[n0.clone()]),
        fixtures::policy(100.0, 1),
    );
    cluster.add(n0.clone(), cfg.clone());
    cluster.start();
    wait_height(&cluster.members[0], Height(2), WAIT).await;
    cluster.stop().await;

    // A crash between writing block data and committing the database.
    let common::Member {
        test,
        node,
        db,
        blockdata,
    } = cluster.members.pop().unwrap();
    drop(node);
    let head = db.last_manifest().await.unwrap().unwrap();
    let orphan_height = head.height().next();
    let orphan = fixtures::block(
        &[n0],
        orphan_height,
        head.hash().clone(),
        &[("orphan", b"1".as_slice())],
    );
    let mut session = blockdata
        .new_session(orphan_height, orphan.hash())
        .await
        .unwrap();
    session.save_block(&orphan).await.unwrap();
    session.done().await.unwrap();
    assert!(blockdata.exists(orphan_height).await.unwrap());

    let restarted = common::Member {
        test,
        node: Node::new(&cfg, db.clone(), blockdata.clone()).unwrap(),
        db,
        blockdata,
    };
    restarted.node.start();
    let recovered = wait_height(&restarted, orphan_height, WAIT).await;
    assert_ne!(recovered.hash(), orphan.hash());
    assert_chained(&head, &recovered);
    assert!(restarted.db.state("orphan").await.unwrap().is_none());
    restarted.node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_points_push_to_next_round() {
    let mut cluster = Cluster::new();
    let n0 = TestNode::new("n0");
    let mut cfg = config(
        cluster.path(),
        &n0,
        &[],
        fixed(&n0, &[n0.clone()]),
        fixtures::policy(100.0, 1),
    );
    cfg.error_points.when_prepare.push(ErrorPoint {
        height: Height(2),
        round: Round::ZERO,
        kind: ErrorPointKind::Error,
    });
    cfg.error_points.when_save.push(ErrorPoint {
        height: Height(3),
        round: Round::ZERO,
        kind: ErrorPointKind::Error,
    });
    cluster.add(n0, cfg);
    cluster.start();

    let member = &cluster.members[0];
    let third = wait_height(member, Height(3), WAIT).await;
    assert_eq!(third.round(), Round(1));
    let second = member.db.manifest_by_height(Height(2)).await.unwrap().unwrap();
    assert_eq!(second.round(), Round(1));
    assert_eq!(member.node.state(), StateKind::Consensus);

    cluster.stop().await;
}

/// Storage that fails the first INIT voteproof save at `fail_at` with a timeout
/// and otherwise defers to redb.
struct TimingOutDatabase {
    inner: Arc<RedbDatabase>,
    fail_at: Height,
    failed: AtomicBool,
}

#[async_trait]
impl StateReader for TimingOutDatabase {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        self.inner.state(key).await
    }
}

#[async_trait]
impl Database for TimingOutDatabase {
    async fn last_manifest(&self) -> Result<Option<Manifest>, StorageError> {
        self.inner.last_manifest().await
    }

    async fn manifest_by_height(&self, height: Height) -> Result<Option<Manifest>, StorageError> {
        self.inner.manifest_by_height(height).await
    }

    async fn manifest(&self, hash: &Hash) -> Result<Option<Manifest>, StorageError> {
        self.inner.manifest(hash).await
    }

    async fn block_by_height(&self, height: Height) -> Result<Option<Block>, StorageError> {
        self.inner.block_by_height(height).await
    }

    async fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        self.inner.block(hash).await
    }

    async fn blockdata_map(&self, height: Height) -> Result<Option<BlockDataMap>, StorageError> {
        self.inner.blockdata_map(height).await
    }

    async fn new_seals(&self, seals: &[Seal]) -> Result<(), StorageError> {
        self.inner.new_seals(seals).await
    }

    async fn seal(&self, hash: &Hash) -> Result<Option<Seal>, StorageError> {
        self.inner.seal(hash).await
    }

    async fn staged_operation_seals(
        &self,
        order: SealOrder,
    ) -> Result<Vec<OperationSeal>, StorageError> {
        self.inner.staged_operation_seals(order).await
    }

    async fn unstage_operation_seals(&self, hashes: &[Hash]) -> Result<(), StorageError> {
        self.inner.unstage_operation_seals(hashes).await
    }

    async fn new_proposal(&self, proposal: &Ballot) -> Result<(), StorageError> {
        self.inner.new_proposal(proposal).await
    }

    async fn proposal(&self, height: Height, round: Round) -> Result<Option<Ballot>, StorageError> {
        self.inner.proposal(height, round).await
    }

    async fn proposal_by_fact(&self, fact: &Hash) -> Result<Option<Ballot>, StorageError> {
        self.inner.proposal_by_fact(fact).await
    }

    async fn has_operation(&self, fact: &Hash) -> Result<bool, StorageError> {
        self.inner.has_operation(fact).await
    }

    async fn new_state(&self, state: &State) -> Result<(), StorageError> {
        self.inner.new_state(state).await
    }

    async fn new_init_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError> {
        if voteproof.height() == self.fail_at && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Timeout);
        }
        self.inner.new_init_voteproof(voteproof).await
    }

    async fn new_accept_voteproof(&self, voteproof: &Voteproof) -> Result<(), StorageError> {
        self.inner.new_accept_voteproof(voteproof).await
    }

    async fn voteproof(
        &self,
        height: Height,
        stage: Stage,
    ) -> Result<Option<Voteproof>, StorageError> {
        self.inner.voteproof(height, stage).await
    }

    async fn last_voteproof(&self, stage: Stage) -> Result<Option<Voteproof>, StorageError> {
        self.inner.last_voteproof(stage).await
    }

    async fn open_block_storage(
        &self,
        block: Block,
    ) -> Result<Box<dyn BlockStorage>, StorageError> {
        self.inner.open_block_storage(block).await
    }

    async fn syncer_storage(&self) -> Result<Box<dyn SyncerStorage>, StorageError> {
        self.inner.syncer_storage().await
    }

    async fn clean(&self) -> Result<(), StorageError> {
        self.inner.clean().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_storage_timeout_in_consensus_resyncs_and_recovers() {
    let mut cluster = Cluster::new();
    let n0 = TestNode::new("n0");
    let cfg = config(
        cluster.path(),
        &n0,
        &[],
        fixed(&n0, &[n0.clone()]),
        fixtures::policy(100.0, 1),
    );
    let flaky = Arc::new(OnceLock::new());
    let slot = flaky.clone();
    cluster.add_with(n0, cfg, move |inner| {
        let db = Arc::new(TimingOutDatabase {
            inner,
            fail_at: Height(2),
            failed: AtomicBool::new(false),
        });
        let _ = slot.set(db.clone());
        db as Arc<dyn Database>
    });
    let flaky: Arc<TimingOutDatabase> = flaky.get().unwrap().clone();
    cluster.start();

    let member = &cluster.members[0];
    wait_height(member, Height(1), WAIT).await;
    wait_for("injected timeout", WAIT, || {
        let fired = flaky.failed.load(Ordering::SeqCst);
        async move { fired }
    })
    .await;

    // the timeout is not fatal: the node syncs from its head and carries on
    let fourth = wait_height(member, Height(4), WAIT).await;
    assert_eq!(fourth.height(), Height(4));
    let second = member.db.manifest_by_height(Height(2)).await.unwrap().unwrap();
    assert!(member.db.voteproof(Height(2), Stage::Init).await.unwrap().is_some());
    let third = member.db.manifest_by_height(Height(3)).await.unwrap().unwrap();
    assert_chained(&second, &third);
    assert_ne!(member.node.state(), StateKind::Broken);

    cluster.stop().await;
}
