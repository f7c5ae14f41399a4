// Path: crates/consensus/src/ballotbox.rs
//! Collects the votes of one `(height, round, stage)` and emits its
//! voteproof once.
//!
//! Each `(height, round, stage)` has its own record behind its own mutex.
//! The threshold ratio is read from [`LocalPolicy`] before any record is
//! locked. A node voting two different facts in the same record loses both
//! votes and every later vote in that record.

use crate::local::LocalPolicy;
use crate::metrics::metrics;
use isaac_api::consensus::{ActingSuffrage, Suffrage};
use isaac_types::app::{
    find_majority, Address, Ballot, BallotFact, Hash, Height, Round, Stage, Threshold,
    VoteResult, Voteproof, VoteproofNodeFact,
};
use isaac_types::error::BallotError;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Key = (Height, Round, Stage);

struct Record {
    acting: ActingSuffrage,
    stage: Stage,
    ballots: BTreeMap<Address, Ballot>,
    equivocated: BTreeSet<Address>,
    voteproof: Option<Voteproof>,
}

impl Record {
    fn tally(&self, ratio: f64) -> Result<Option<Voteproof>, BallotError> {
        let threshold = Threshold::new(self.acting.nodes.len(), ratio)?;
        let mut facts: Vec<(Hash, BallotFact)> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for ballot in self.ballots.values() {
            match facts.iter().position(|(h, _)| h == ballot.fact_hash()) {
                Some(i) => {
                    if let Some(c) = counts.get_mut(i) {
                        *c += 1;
                    }
                }
                None => {
                    facts.push((ballot.fact_hash().clone(), ballot.fact().clone()));
                    counts.push(1);
                }
            }
        }
        let (result, _) = find_majority(&threshold, &counts);
        if result == VoteResult::NotYet {
            return Ok(None);
        }
        let votes = self
            .ballots
            .values()
            .map(|b| VoteproofNodeFact {
                node: b.node().clone(),
                signer: b.signer().clone(),
                fact: b.fact_hash().clone(),
                signature: b.fact_signature().clone(),
            })
            .collect();
        Voteproof::new(
            self.acting.height,
            self.acting.round,
            self.stage,
            ratio,
            self.acting.nodes.clone(),
            facts.into_iter().map(|(_, f)| f).collect(),
            votes,
        )
        .map(Some)
    }
}

/// The vote collector of one node.
pub struct Ballotbox {
    suffrage: Arc<dyn Suffrage>,
    policy: Arc<LocalPolicy>,
    records: RwLock<BTreeMap<Key, Arc<Mutex<Record>>>>,
}

impl std::fmt::Debug for Ballotbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ballotbox")
            .field("suffrage", &self.suffrage.name())
            .field("records", &self.records.read().len())
            .finish()
    }
}

impl Ballotbox {
    pub fn new(suffrage: Arc<dyn Suffrage>, policy: Arc<LocalPolicy>) -> Self {
        Self {
            suffrage,
            policy,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    fn record(&self, key: Key) -> Arc<Mutex<Record>> {
        if let Some(r) = self.records.read().get(&key) {
            return r.clone();
        }
        let (height, round, stage) = key;
        self.records
            .write()
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Record {
                    acting: self.suffrage.acting(height, round),
                    stage,
                    ballots: BTreeMap::new(),
                    equivocated: BTreeSet::new(),
                    voteproof: None,
                }))
            })
            .clone()
    }

    /// Votes `ballot`. The voteproof is returned by the one call that
    /// finished the record; later calls get its result without it.
    ///
    /// The ballot must already be verified.
    pub fn vote(&self, ballot: &Ballot) -> Result<(VoteResult, Option<Voteproof>), BallotError> {
        let stage = ballot.stage();
        if !stage.can_vote() {
            return Err(BallotError::InvalidBallot(format!(
                "{stage} ballots are not voted"
            )));
        }
        let (height, round) = (ballot.height(), ballot.round());
        let node = ballot.node();
        let ratio = self.policy.threshold_ratio();

        let record = self.record((height, round, stage));
        let mut rec = record.lock();
        if !rec.acting.exists(node) {
            return Err(BallotError::NotInSuffrage {
                node: node.clone(),
                height,
                round,
            });
        }
        if let Some(vp) = &rec.voteproof {
            return Ok((vp.result(), None));
        }
        let equivocation = || BallotError::Equivocation {
            node: node.clone(),
            height,
            round,
            stage,
        };
        if rec.equivocated.contains(node) {
            return Err(equivocation());
        }
        match rec.ballots.get(node) {
            Some(prev) if prev.fact_hash() == ballot.fact_hash() => {
                return Ok((VoteResult::NotYet, None));
            }
            Some(_) => {
                rec.ballots.remove(node);
                rec.equivocated.insert(node.clone());
                drop(rec);
                metrics().inc_equivocations();
                tracing::warn!(
                    target: "ballotbox",
                    event = "equivocation",
                    node = %node,
                    height = height.0,
                    round = round.0,
                    stage = %stage,
                    "node voted two facts; both votes discarded"
                );
                return Err(equivocation());
            }
            None => {
                rec.ballots.insert(node.clone(), ballot.clone());
            }
        }

        let Some(vp) = rec.tally(ratio)? else {
            return Ok((VoteResult::NotYet, None));
        };
        rec.voteproof = Some(vp.clone());
        drop(rec);

        self.tidy(height, round);
        metrics().inc_voteproofs(&stage.to_string(), &vp.result().to_string());
        tracing::info!(
            target: "ballotbox",
            event = "voteproof",
            height = height.0,
            round = round.0,
            stage = %stage,
            result = %vp.result(),
            votes = vp.votes().len(),
            "voteproof finished"
        );
        Ok((vp.result(), Some(vp)))
    }

    /// The finished voteproof of `(height, round, stage)`.
    pub fn voteproof(&self, height: Height, round: Round, stage: Stage) -> Option<Voteproof> {
        let record = self.records.read().get(&(height, round, stage)).cloned()?;
        let rec = record.lock();
        rec.voteproof.clone()
    }

    /// Whether `node` equivocated in `(height, round, stage)`.
    pub fn is_equivocated(&self, height: Height, round: Round, stage: Stage, node: &Address) -> bool {
        self.records
            .read()
            .get(&(height, round, stage))
            .map(|r| r.lock().equivocated.contains(node))
            .unwrap_or(false)
    }

    /// Drops every record below `(height, round)`.
    fn tidy(&self, height: Height, round: Round) {
        self.records
            .write()
            .retain(|(h, r, _), _| *h > height || (*h == height && *r >= round));
    }

    /// Number of open records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suffrage::{FixedProposer, Roundrobin};
    use isaac_test_utils::fixtures::{self, TestNode};

    fn ballotbox(nodes: &[TestNode], ratio: f64) -> Ballotbox {
        let suffrage = FixedProposer::new(
            nodes[0].address.clone(),
            nodes.iter().map(|n| n.address.clone()).collect(),
        )
        .unwrap();
        Ballotbox::new(
            Arc::new(suffrage),
            Arc::new(LocalPolicy::new(fixtures::policy(ratio, nodes.len()))),
        )
    }

    fn init(height: i64, round: u64, previous: &[u8]) -> BallotFact {
        BallotFact::Init {
            height: Height(height),
            round: Round(round),
            previous_block: Hash::sha256(previous),
        }
    }

    #[test]
    fn test_majority_is_emitted_once() {
        let nodes = TestNode::many(4);
        let bb = ballotbox(&nodes, 67.0);
        let fact = init(1, 0, b"p");

        assert_eq!(bb.vote(&nodes[0].ballot(fact.clone(), None)).unwrap(), (VoteResult::NotYet, None));
        assert_eq!(bb.vote(&nodes[1].ballot(fact.clone(), None)).unwrap().0, VoteResult::NotYet);
        let (result, vp) = bb.vote(&nodes[2].ballot(fact.clone(), None)).unwrap();
        assert_eq!(result, VoteResult::Majority);
        let vp = vp.unwrap();
        assert_eq!(vp.majority(), Some(&fact));
        assert_eq!(vp.votes().len(), 3);
        assert!(vp.is_valid(fixtures::NETWORK_ID).is_ok());

        let (late, none) = bb.vote(&nodes[3].ballot(fact, None)).unwrap();
        assert_eq!(late, VoteResult::Majority);
        assert!(none.is_none());
        assert!(bb.voteproof(Height(1), Round(0), Stage::Init).is_some());
    }

    #[test]
    fn test_redelivery_is_dropped() {
        let nodes = TestNode::many(3);
        let bb = ballotbox(&nodes, 100.0);
        let ballot = nodes[0].ballot(init(1, 0, b"p"), None);
        bb.vote(&ballot).unwrap();
        assert_eq!(bb.vote(&ballot).unwrap(), (VoteResult::NotYet, None));
        assert!(!bb.is_equivocated(Height(1), Round(0), Stage::Init, &nodes[0].address));
    }

    #[test]
    fn test_draw_needs_every_acting_vote() {
        let nodes = TestNode::many(3);
        let bb = ballotbox(&nodes, 67.0);
        bb.vote(&nodes[0].ballot(init(2, 0, b"a"), None)).unwrap();
        assert_eq!(
            bb.vote(&nodes[1].ballot(init(2, 0, b"b"), None)).unwrap().0,
            VoteResult::NotYet
        );
        let (result, vp) = bb.vote(&nodes[2].ballot(init(2, 0, b"c"), None)).unwrap();
        assert_eq!(result, VoteResult::Draw);
        let vp = vp.unwrap();
        assert!(vp.majority().is_none());
        assert_eq!(vp.facts().len(), 3);
    }

    #[test]
    fn test_equivocation_discards_both_votes() {
        let nodes = TestNode::many(4);
        let bb = ballotbox(&nodes, 67.0);
        let good = init(3, 0, b"p");

        bb.vote(&nodes[3].ballot(good.clone(), None)).unwrap();
        let err = bb
            .vote(&nodes[3].ballot(init(3, 0, b"fork"), None))
            .unwrap_err();
        assert!(matches!(err, BallotError::Equivocation { .. }));
        assert!(bb.is_equivocated(Height(3), Round(0), Stage::Init, &nodes[3].address));
        assert!(matches!(
            bb.vote(&nodes[3].ballot(good.clone(), None)),
            Err(BallotError::Equivocation { .. })
        ));

        bb.vote(&nodes[0].ballot(good.clone(), None)).unwrap();
        bb.vote(&nodes[1].ballot(good.clone(), None)).unwrap();
        let (_, vp) = bb.vote(&nodes[2].ballot(good, None)).unwrap();
        let vp = vp.unwrap();
        assert!(vp.votes().iter().all(|v| v.node != nodes[3].address));
        assert_eq!(vp.votes().len(), 3);
    }

    #[test]
    fn test_outsiders_and_proposals_are_rejected() {
        let nodes = TestNode::many(2);
        let bb = ballotbox(&nodes, 67.0);
        let outsider = TestNode::new("zz");
        assert!(matches!(
            bb.vote(&outsider.ballot(init(1, 0, b"p"), None)),
            Err(BallotError::NotInSuffrage { .. })
        ));
        let proposal = nodes[0].ballot(
            BallotFact::Proposal {
                height: Height(1),
                round: Round(0),
                proposer: nodes[0].address.clone(),
                operations: Vec::new(),
                seals: Vec::new(),
            },
            None,
        );
        isaac_test_utils::assert_error_code!(bb.vote(&proposal), "BALLOT_INVALID");
    }

    #[test]
    fn test_threshold_counts_acting_nodes_only() {
        let nodes = TestNode::many(4);
        let suffrage = Roundrobin::new(nodes.iter().map(|n| n.address.clone()).collect(), 1).unwrap();
        let acting = suffrage.acting(Height(1), Round(0));
        let bb = Ballotbox::new(
            Arc::new(suffrage),
            Arc::new(LocalPolicy::new(fixtures::policy(100.0, 1))),
        );
        let voter = nodes.iter().find(|n| n.address == acting.proposer).unwrap();
        let (result, vp) = bb.vote(&voter.ballot(init(1, 0, b"p"), None)).unwrap();
        assert_eq!(result, VoteResult::Majority);
        assert_eq!(vp.unwrap().suffrages().len(), 1);
    }

    #[test]
    fn test_finished_round_tidies_older_records() {
        let nodes = TestNode::many(1);
        let bb = ballotbox(&nodes, 100.0);
        bb.vote(&nodes[0].ballot(init(1, 0, b"p"), None)).unwrap();
        bb.vote(&nodes[0].ballot(init(1, 1, b"p"), None)).unwrap();
        assert_eq!(bb.len(), 1);
        bb.vote(&nodes[0].ballot(init(2, 0, b"q"), None)).unwrap();
        assert_eq!(bb.len(), 1);
        assert!(bb.voteproof(Height(1), Round(1), Stage::Init).is_none());
        assert!(bb.voteproof(Height(2), Round(0), Stage::Init).is_some());
    }
}
