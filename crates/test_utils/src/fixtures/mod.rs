//! Test fixtures for reproducible tests
//!
//! Blocks built here pass `Block::is_valid` for [`NETWORK_ID`]: trees,
//! states and both voteproofs agree with the manifest.

use isaac_crypto::sign::{KeyKind, Privatekey, Publickey};
use isaac_state::tree::avl::AvlTreeBuilder;
use isaac_types::app::{
    operation_tree_value, Address, Ballot, BallotFact, Block, FixedTree, Hash, Height, Manifest,
    Operation, OperationFact, OperationSeal, Round, State, SuffrageInfo, SuffrageNode,
    Timestamp, Value, Voteproof, VoteproofNodeFact,
};
use isaac_types::config::Policy;
use std::time::Duration;
use tempfile::TempDir;

/// Network id used by every fixture.
pub const NETWORK_ID: &[u8] = b"isaac-test-network";

/// A node identity with a fresh secp256k1 key.
#[derive(Clone)]
pub struct TestNode {
    /// Node address.
    pub address: Address,
    /// Node key.
    pub key: Privatekey,
}

impl TestNode {
    /// A node named `name`. Panics on an invalid address.
    pub fn new(name: &str) -> Self {
        match Address::new(name) {
            Ok(address) => Self {
                address,
                key: Privatekey::generate(KeyKind::Btc),
            },
            Err(e) => panic!("invalid fixture address {name:?}: {e}"),
        }
    }

    /// `count` nodes named `n0`, `n1`, ...
    pub fn many(count: usize) -> Vec<Self> {
        (0..count).map(|i| Self::new(&format!("n{i}"))).collect()
    }

    /// The public key.
    pub fn publickey(&self) -> Publickey {
        self.key.publickey()
    }

    /// The suffrage entry of this node.
    pub fn suffrage_node(&self) -> SuffrageNode {
        SuffrageNode {
            address: self.address.clone(),
            publickey: self.publickey(),
        }
    }

    /// Signs `fact` as a ballot of this node.
    pub fn ballot(&self, fact: BallotFact, voteproof: Option<Voteproof>) -> Ballot {
        match Ballot::new(fact, self.address.clone(), &self.key, NETWORK_ID, voteproof) {
            Ok(b) => b,
            Err(e) => panic!("ballot fixture: {e}"),
        }
    }

    /// The vote of this node on `fact`.
    pub fn vote(&self, fact: &BallotFact) -> VoteproofNodeFact {
        let hash = fact.generate_hash();
        match self.key.sign(hash.as_bytes(), NETWORK_ID) {
            Ok(signature) => VoteproofNodeFact {
                node: self.address.clone(),
                signer: self.publickey(),
                fact: hash,
                signature,
            },
            Err(e) => panic!("vote fixture: {e}"),
        }
    }
}

/// A policy with fast timers for in-process clusters.
pub fn policy(threshold_ratio: f64, acting: usize) -> Policy {
    Policy {
        threshold_ratio,
        number_of_acting_suffrage_nodes: acting,
        timeout_waiting_proposal: Duration::from_millis(800),
        interval_broadcasting_init_ballot: Duration::from_millis(100),
        interval_broadcasting_proposal: Duration::from_millis(100),
        wait_broadcasting_accept_ballot: Duration::from_millis(50),
        interval_broadcasting_accept_ballot: Duration::from_millis(100),
        timeout_process_proposal: Duration::from_secs(5),
        ..Policy::default()
    }
}

/// `previous_block` of the genesis block.
pub fn genesis_previous_block() -> Hash {
    Hash::sha256(NETWORK_ID)
}

/// A key-value operation signed by `node`.
pub fn kv_operation(node: &TestNode, key: &str, value: &[u8]) -> Operation {
    match Operation::new(OperationFact::key_value(key, value), &node.key, NETWORK_ID) {
        Ok(op) => op,
        Err(e) => panic!("operation fixture: {e}"),
    }
}

/// An increment operation signed by `node`.
pub fn increment_operation(node: &TestNode, key: &str, amount: i64) -> Operation {
    match Operation::new(OperationFact::increment(key, amount), &node.key, NETWORK_ID) {
        Ok(op) => op,
        Err(e) => panic!("operation fixture: {e}"),
    }
}

/// Seals `operations` with the key of `node`.
pub fn operation_seal(node: &TestNode, operations: Vec<Operation>) -> OperationSeal {
    match OperationSeal::new(operations, &node.key, NETWORK_ID) {
        Ok(seal) => seal,
        Err(e) => panic!("seal fixture: {e}"),
    }
}

/// A MAJORITY voteproof of `fact` signed by every node of `nodes`.
pub fn voteproof(nodes: &[TestNode], fact: BallotFact) -> Voteproof {
    let votes = nodes.iter().map(|n| n.vote(&fact)).collect();
    let suffrages = nodes.iter().map(|n| n.address.clone()).collect();
    match Voteproof::new(
        fact.height(),
        fact.round(),
        fact.stage(),
        100.0,
        suffrages,
        vec![fact],
        votes,
    ) {
        Ok(vp) => vp,
        Err(e) => panic!("voteproof fixture: {e}"),
    }
}

fn tree<I: IntoIterator<Item = (Vec<u8>, Hash)>>(entries: I) -> FixedTree {
    let mut builder = AvlTreeBuilder::new();
    for (k, v) in entries {
        if let Err(e) = builder.insert(k, v) {
            panic!("tree fixture: {e}");
        }
    }
    match builder.build() {
        Ok(t) => t,
        Err(e) => panic!("tree fixture: {e}"),
    }
}

/// A block at `height` on top of `previous_block`, proposed and confirmed by
/// `nodes` alone, setting one bytes value per `(key, value)` pair.
pub fn block(
    nodes: &[TestNode],
    height: Height,
    previous_block: Hash,
    kvs: &[(&str, &[u8])],
) -> Block {
    let Some(proposer) = nodes.first() else {
        panic!("block fixture needs at least one node");
    };
    let operations: Vec<Operation> = kvs
        .iter()
        .map(|(k, v)| kv_operation(proposer, k, v))
        .collect();
    let seal = (!operations.is_empty()).then(|| operation_seal(proposer, operations));
    block_from_seal(nodes, height, previous_block, seal.as_ref())
}

/// Like [`block`], carrying the key-value operations of `seal`.
pub fn block_from_seal(
    nodes: &[TestNode],
    height: Height,
    previous_block: Hash,
    seal: Option<&OperationSeal>,
) -> Block {
    let Some(proposer) = nodes.first() else {
        panic!("block fixture needs at least one node");
    };
    let round = Round::ZERO;
    let operations: Vec<Operation> = seal.map(|s| s.operations().to_vec()).unwrap_or_default();
    let proposal = proposer.ballot(
        BallotFact::Proposal {
            height,
            round,
            proposer: proposer.address.clone(),
            operations: operations.iter().map(|op| op.fact_hash().clone()).collect(),
            seals: seal.map(|s| vec![s.hash().clone()]).unwrap_or_default(),
        },
        None,
    );

    let mut states: Vec<State> = Vec::new();
    for op in &operations {
        let OperationFact::KeyValue { key, value, .. } = op.fact() else {
            panic!("block fixture only carries key-value operations");
        };
        let st = State::new(key.as_str(), Some(Value::bytes(value.clone())), height)
            .and_then(|st| {
                st.add_operation(op.fact_hash().clone())
                    .set_previous_block(previous_block.clone())
                    .set_hash()
            });
        match st {
            Ok(st) => {
                states.retain(|s| s.key() != st.key());
                states.push(st);
            }
            Err(e) => panic!("state fixture: {e}"),
        }
    }
    states.sort_by(|a, b| a.key().cmp(b.key()));

    let operations_tree = tree(operations.iter().map(|op| {
        (
            op.fact_hash().as_bytes().to_vec(),
            operation_tree_value(op.fact_hash(), true),
        )
    }));
    let states_tree = tree(states.iter().filter_map(|st| {
        st.hash()
            .map(|h| (st.key().as_bytes().to_vec(), h.clone()))
    }));

    let manifest = Manifest::new(
        height,
        round,
        proposal.fact_hash().clone(),
        previous_block.clone(),
        operations_tree.root_hash().cloned(),
        states_tree.root_hash().cloned(),
    );
    let init_voteproof = voteproof(
        nodes,
        BallotFact::Init {
            height,
            round,
            previous_block,
        },
    );
    let accept_voteproof = voteproof(
        nodes,
        BallotFact::Accept {
            height,
            round,
            proposal: proposal.fact_hash().clone(),
            new_block: manifest.hash().clone(),
        },
    );
    Block {
        manifest: manifest.confirm(Timestamp::now()),
        operations,
        operations_tree,
        states,
        states_tree,
        init_voteproof,
        accept_voteproof,
        suffrage_info: SuffrageInfo {
            proposer: proposer.address.clone(),
            nodes: nodes.iter().map(TestNode::suffrage_node).collect(),
        },
        proposal,
    }
}

/// `len` chained blocks from genesis, each setting `k<height>`.
pub fn chain(nodes: &[TestNode], len: usize) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::with_capacity(len);
    let mut previous = genesis_previous_block();
    for i in 0..len {
        let key = format!("k{i}");
        let value = [i as u8];
        let b = block(nodes, Height(i as i64), previous, &[(key.as_str(), &value[..])]);
        previous = b.hash().clone();
        out.push(b);
    }
    out
}

/// A fresh temporary directory, removed on drop.
pub fn tempdir() -> TempDir {
    match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => panic!("tempdir fixture: {e}"),
    }
}
