// Path: crates/storage/src/database/tests.rs
use super::*;
use isaac_test_utils::fixtures::{self, TestNode};
use isaac_types::app::{BallotFact, Value};

fn open(dir: &tempfile::TempDir) -> RedbDatabase {
    RedbDatabase::open(dir.path().join("isaac.redb"), Duration::from_secs(2)).unwrap()
}

fn map_of(block: &Block) -> BlockDataMap {
    BlockDataMap::new(block.height(), block.hash().clone())
}

async fn commit(db: &RedbDatabase, block: &Block) {
    let mut bs = db.open_block_storage(block.clone()).await.unwrap();
    bs.set_blockdata_map(map_of(block)).await.unwrap();
    bs.commit().await.unwrap();
}

#[tokio::test]
async fn test_empty_database_has_no_head() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    assert!(db.last_manifest().await.unwrap().is_none());
    assert!(db.manifest_by_height(Height::NIL).await.unwrap().is_none());
    assert!(db.last_voteproof(Stage::Accept).await.unwrap().is_none());
    assert!(db.state("k0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_commit_makes_block_visible() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(1);
    let chain = fixtures::chain(&nodes, 2);

    for b in &chain {
        commit(&db, b).await;
    }

    let head = db.last_manifest().await.unwrap().unwrap();
    assert_eq!(head.height(), Height(1));
    assert_eq!(head.previous_block(), chain[0].hash());
    assert_eq!(db.manifest(chain[0].hash()).await.unwrap().unwrap(), chain[0].manifest);
    assert_eq!(db.block_by_height(Height(1)).await.unwrap().unwrap(), chain[1]);
    assert_eq!(db.blockdata_map(Height(0)).await.unwrap().unwrap().block, *chain[0].hash());

    for op in chain.iter().flat_map(|b| &b.operations) {
        assert!(db.has_operation(op.fact_hash()).await.unwrap());
    }
    assert!(!db.has_operation(&Hash::sha256(b"unknown")).await.unwrap());

    let st = db.state("k1").await.unwrap().unwrap();
    assert_eq!(st.value(), Some(&Value::bytes(vec![1u8])));
    assert_eq!(st.height(), Height(1));

    let proposal = db.proposal(Height(1), Round(0)).await.unwrap().unwrap();
    assert_eq!(proposal.fact_hash(), chain[1].proposal.fact_hash());
    assert!(db
        .proposal_by_fact(chain[0].proposal.fact_hash())
        .await
        .unwrap()
        .is_some());

    let accept = db.last_voteproof(Stage::Accept).await.unwrap().unwrap();
    assert_eq!(accept.height(), Height(1));
    assert!(db.voteproof(Height(0), Stage::Init).await.unwrap().is_some());
}

#[tokio::test]
async fn test_block_must_extend_head() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(1);
    let chain = fixtures::chain(&nodes, 2);
    commit(&db, &chain[0]).await;

    let bs = db.open_block_storage(chain[0].clone()).await.unwrap();
    isaac_test_utils::assert_error_code!(bs.commit().await, "STORAGE_DUPLICATED");

    let stray = fixtures::block(&nodes, Height(1), Hash::sha256(b"elsewhere"), &[]);
    let bs = db.open_block_storage(stray).await.unwrap();
    isaac_test_utils::assert_error_code!(bs.commit().await, "STORAGE_BACKEND");

    let gap = fixtures::block(&nodes, Height(2), chain[1].hash().clone(), &[]);
    let bs = db.open_block_storage(gap).await.unwrap();
    assert!(bs.commit().await.is_err());

    assert_eq!(db.last_manifest().await.unwrap().unwrap().height(), Height(0));
}

#[tokio::test]
async fn test_cancelled_block_storage_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(1);
    let chain = fixtures::chain(&nodes, 1);

    let mut bs = db.open_block_storage(chain[0].clone()).await.unwrap();
    bs.set_blockdata_map(map_of(&chain[0])).await.unwrap();
    bs.cancel().await.unwrap();

    assert!(db.last_manifest().await.unwrap().is_none());
    assert!(db.state("k0").await.unwrap().is_none());
    assert!(!db
        .has_operation(chain[0].operations[0].fact_hash())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_staged_seals_order_and_unstage() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let node = TestNode::new("n0");
    let seals: Vec<OperationSeal> = (0..3)
        .map(|i| {
            let op = fixtures::kv_operation(&node, &format!("s{i}"), &[i]);
            fixtures::operation_seal(&node, vec![op])
        })
        .collect();
    let as_seals: Vec<Seal> = seals.iter().cloned().map(Seal::from).collect();

    db.new_seals(&as_seals).await.unwrap();
    db.new_seals(&as_seals[..1]).await.unwrap();

    let oldest = db.staged_operation_seals(SealOrder::Oldest).await.unwrap();
    let hashes: Vec<&Hash> = oldest.iter().map(|s| s.hash()).collect();
    assert_eq!(hashes, seals.iter().map(|s| s.hash()).collect::<Vec<_>>());

    let newest = db.staged_operation_seals(SealOrder::Newest).await.unwrap();
    assert_eq!(newest.first().map(|s| s.hash()), Some(seals[2].hash()));

    db.unstage_operation_seals(&[seals[1].hash().clone()])
        .await
        .unwrap();
    let left = db.staged_operation_seals(SealOrder::Oldest).await.unwrap();
    assert_eq!(left.len(), 2);
    assert!(db.has_seal(seals[1].hash()).await.unwrap());
    assert_eq!(db.seals(&[seals[1].hash().clone()]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_unstages_proposal_seals() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(1);
    let carried = fixtures::operation_seal(
        &nodes[0],
        vec![fixtures::kv_operation(&nodes[0], "a", b"1")],
    );
    let pending = fixtures::operation_seal(
        &nodes[0],
        vec![fixtures::kv_operation(&nodes[0], "b", b"2")],
    );
    db.new_seals(&[carried.clone().into(), pending.clone().into()])
        .await
        .unwrap();

    let block = fixtures::block_from_seal(
        &nodes,
        Height::GENESIS,
        fixtures::genesis_previous_block(),
        Some(&carried),
    );
    commit(&db, &block).await;

    let staged = db.staged_operation_seals(SealOrder::Oldest).await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].hash(), pending.hash());
    assert!(db.has_seal(carried.hash()).await.unwrap());
}

#[tokio::test]
async fn test_voteproof_upsert_keeps_larger_vote_set() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(3);
    let fact = BallotFact::Init {
        height: Height(4),
        round: Round(0),
        previous_block: Hash::sha256(b"p"),
    };
    let suffrages: Vec<_> = nodes.iter().map(|n| n.address.clone()).collect();
    let build = |voters: &[TestNode]| {
        Voteproof::new(
            Height(4),
            Round(0),
            Stage::Init,
            67.0,
            suffrages.clone(),
            vec![fact.clone()],
            voters.iter().map(|n| n.vote(&fact)).collect(),
        )
        .unwrap()
    };
    let two = build(&nodes[..2]);
    let three = build(&nodes);

    db.new_init_voteproof(&two).await.unwrap();
    db.new_init_voteproof(&three).await.unwrap();
    db.new_init_voteproof(&two).await.unwrap();
    let stored = db.voteproof(Height(4), Stage::Init).await.unwrap().unwrap();
    assert_eq!(stored.votes().len(), 3);

    assert!(db.new_accept_voteproof(&two).await.is_err());
}

#[tokio::test]
async fn test_syncer_storage_checks_staged_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let nodes = TestNode::many(1);
    let chain = fixtures::chain(&nodes, 3);
    let forked = fixtures::block(&nodes, Height(1), chain[0].hash().clone(), &[("z", b"z")]);

    let mut syncer = db.syncer_storage().await.unwrap();
    syncer
        .set_manifests(chain.iter().map(|b| b.manifest.clone()).collect())
        .await
        .unwrap();
    assert_eq!(syncer.last_manifest().map(|m| m.height()), Some(Height(2)));

    syncer
        .set_block(chain[0].clone(), map_of(&chain[0]))
        .await
        .unwrap();
    assert!(syncer
        .set_block(forked.clone(), map_of(&forked))
        .await
        .is_err());
    for b in &chain[1..] {
        syncer.set_block(b.clone(), map_of(b)).await.unwrap();
    }
    syncer.close().await.unwrap();

    assert_eq!(db.last_manifest().await.unwrap().unwrap().height(), Height(2));
}

#[tokio::test]
async fn test_clean_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let nodes = TestNode::many(1);
    let chain = fixtures::chain(&nodes, 1);
    {
        let db = open(&dir);
        commit(&db, &chain[0]).await;
    }
    let db = open(&dir);
    assert_eq!(db.last_manifest().await.unwrap().unwrap().height(), Height(0));

    db.new_state(&State::new("loose", None, Height(0)).unwrap())
        .await
        .unwrap();
    db.clean().await.unwrap();
    assert!(db.last_manifest().await.unwrap().is_none());
    assert!(db.state("loose").await.unwrap().is_none());
}
