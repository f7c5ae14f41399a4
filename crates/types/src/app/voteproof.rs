// Path: crates/types/src/app/voteproof.rs
//! Thresholds, tallies and voteproofs.

use crate::app::{Address, BallotFact, Hash, Height, Round, Stage, Timestamp};
use crate::error::BallotError;
use crate::hint::{hints, Hint, Hinter};
use isaac_crypto::sign::{Publickey, Signature};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The number of agreeing votes needed out of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Acting suffrage size.
    pub total: usize,
    /// Ratio in percent, within `(0, 100]`.
    pub ratio: f64,
}

impl Threshold {
    /// Validates and builds a threshold.
    pub fn new(total: usize, ratio: f64) -> Result<Self, BallotError> {
        if total == 0 {
            return Err(BallotError::InvalidBallot("threshold total is zero".into()));
        }
        if !(ratio > 0.0 && ratio <= 100.0) {
            return Err(BallotError::InvalidBallot(format!(
                "threshold ratio {ratio} out of (0, 100]"
            )));
        }
        Ok(Self { total, ratio })
    }

    /// `ceil(total * ratio / 100)`.
    pub fn threshold(&self) -> usize {
        let raw = (self.total as f64 * (self.ratio / 100.0)).ceil();
        // ratio <= 100 keeps this within total
        (raw as usize).clamp(1, self.total)
    }
}

/// The outcome of tallying one `(height, round, stage)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteResult {
    /// Not decided yet.
    #[serde(rename = "NOT YET")]
    NotYet,
    /// Every acting node voted and no fact reached the threshold.
    Draw,
    /// One fact reached the threshold.
    Majority,
}

impl VoteResult {
    /// Canonical one-byte tag used inside hashes.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::NotYet => 0,
            Self::Draw => 1,
            Self::Majority => 2,
        }
    }
}

impl std::fmt::Display for VoteResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotYet => "NOT YET",
            Self::Draw => "DRAW",
            Self::Majority => "MAJORITY",
        })
    }
}

/// Tallies `counts` (votes per distinct fact) against `threshold`.
///
/// Returns the result and, for `Majority`, the index of the winning count.
pub fn find_majority(threshold: &Threshold, counts: &[usize]) -> (VoteResult, Option<usize>) {
    let needed = threshold.threshold();
    if let Some((i, _)) = counts.iter().enumerate().find(|(_, c)| **c >= needed) {
        return (VoteResult::Majority, Some(i));
    }
    let voted: usize = counts.iter().sum();
    if voted >= threshold.total {
        return (VoteResult::Draw, None);
    }
    (VoteResult::NotYet, None)
}

/// One signed vote inside a voteproof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteproofNodeFact {
    /// The voting node.
    pub node: Address,
    /// The node's key.
    pub signer: Publickey,
    /// The voted fact hash.
    pub fact: Hash,
    /// Signature over `fact ‖ network_id`.
    pub signature: Signature,
}

/// The finalized outcome of one `(height, round, stage)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voteproof {
    height: Height,
    round: Round,
    stage: Stage,
    threshold_ratio: f64,
    suffrages: Vec<Address>,
    result: VoteResult,
    majority: Option<BallotFact>,
    facts: Vec<BallotFact>,
    votes: Vec<VoteproofNodeFact>,
    finished_at: Timestamp,
}

impl Voteproof {
    /// Builds a finished voteproof from the votes of one stage.
    ///
    /// `facts` holds every distinct fact voted; each vote's `fact` must be
    /// the hash of one of them.
    pub fn new(
        height: Height,
        round: Round,
        stage: Stage,
        threshold_ratio: f64,
        suffrages: Vec<Address>,
        facts: Vec<BallotFact>,
        votes: Vec<VoteproofNodeFact>,
    ) -> Result<Self, BallotError> {
        let mut vp = Self {
            height,
            round,
            stage,
            threshold_ratio,
            suffrages,
            result: VoteResult::NotYet,
            majority: None,
            facts,
            votes,
            finished_at: Timestamp::now(),
        };
        let (result, majority) = vp.tally()?;
        vp.result = result;
        vp.majority = majority;
        Ok(vp)
    }

    fn tally(&self) -> Result<(VoteResult, Option<BallotFact>), BallotError> {
        let threshold = Threshold::new(self.suffrages.len(), self.threshold_ratio)?;
        let hashes: Vec<Hash> = self.facts.iter().map(BallotFact::generate_hash).collect();
        let mut counts = vec![0usize; hashes.len()];
        for vote in &self.votes {
            let idx = hashes
                .iter()
                .position(|h| *h == vote.fact)
                .ok_or_else(|| BallotError::InvalidBallot(format!("unknown fact {}", vote.fact)))?;
            if let Some(c) = counts.get_mut(idx) {
                *c += 1;
            }
        }
        let (result, winner) = find_majority(&threshold, &counts);
        let majority = winner.and_then(|i| self.facts.get(i).cloned());
        Ok((result, majority))
    }

    /// Height.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Round.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Threshold ratio in percent.
    pub fn threshold_ratio(&self) -> f64 {
        self.threshold_ratio
    }

    /// The acting suffrage the votes were tallied against.
    pub fn suffrages(&self) -> &[Address] {
        &self.suffrages
    }

    /// The tally result.
    pub fn result(&self) -> VoteResult {
        self.result
    }

    /// The winning fact.
    pub fn majority(&self) -> Option<&BallotFact> {
        self.majority.as_ref()
    }

    /// Every distinct voted fact.
    pub fn facts(&self) -> &[BallotFact] {
        &self.facts
    }

    /// Every vote.
    pub fn votes(&self) -> &[VoteproofNodeFact] {
        &self.votes
    }

    /// When the tally finished.
    pub fn finished_at(&self) -> Timestamp {
        self.finished_at
    }

    /// Whether the result is `Majority`.
    pub fn is_majority(&self) -> bool {
        self.result == VoteResult::Majority
    }

    /// The identity hash of this voteproof.
    pub fn generate_hash(&self) -> Hash {
        let mut parts = vec![
            self.height.to_be_bytes().to_vec(),
            self.round.to_be_bytes().to_vec(),
            vec![self.stage.as_byte(), self.result.as_byte()],
            self.threshold_ratio.to_be_bytes().to_vec(),
        ];
        if let Some(m) = &self.majority {
            parts.push(m.generate_hash().as_bytes().to_vec());
        }
        for vote in &self.votes {
            parts.push(vote.node.as_bytes().to_vec());
            parts.push(vote.fact.as_bytes().to_vec());
            parts.push(vote.signature.as_bytes().to_vec());
        }
        parts.push(self.finished_at.to_be_bytes().to_vec());
        Hash::sha256_concat(parts)
    }

    /// Re-verifies every vote and re-tallies the result.
    pub fn is_valid(&self, network_id: &[u8]) -> Result<(), BallotError> {
        if self.height < Height::GENESIS {
            return Err(BallotError::InvalidBallot("voteproof below genesis".into()));
        }
        if !self.stage.can_vote() {
            return Err(BallotError::InvalidBallot(format!(
                "voteproof of stage {}",
                self.stage
            )));
        }
        if self.result == VoteResult::NotYet {
            return Err(BallotError::InvalidBallot("unfinished voteproof".into()));
        }
        for fact in &self.facts {
            if fact.height() != self.height || fact.round() != self.round || fact.stage() != self.stage {
                return Err(BallotError::InvalidBallot(format!(
                    "fact of {}/{}/{} in voteproof of {}/{}/{}",
                    fact.height(),
                    fact.round(),
                    fact.stage(),
                    self.height,
                    self.round,
                    self.stage
                )));
            }
        }
        let suffrages: BTreeSet<&Address> = self.suffrages.iter().collect();
        let mut voted = BTreeMap::new();
        for vote in &self.votes {
            if !suffrages.contains(&vote.node) {
                return Err(BallotError::NotInSuffrage {
                    node: vote.node.clone(),
                    height: self.height,
                    round: self.round,
                });
            }
            if voted.insert(&vote.node, &vote.fact).is_some() {
                return Err(BallotError::InvalidBallot(format!(
                    "duplicated vote of {}",
                    vote.node
                )));
            }
            vote.signer
                .verify(vote.fact.as_bytes(), network_id, &vote.signature)
                .map_err(|_| BallotError::InvalidSignature(vote.node.clone()))?;
        }
        let (result, majority) = self.tally()?;
        if result != self.result || majority != self.majority {
            return Err(BallotError::InvalidBallot(format!(
                "voteproof result {} does not match the votes ({result})",
                self.result
            )));
        }
        Ok(())
    }
}

impl Hinter for Voteproof {
    fn hint(&self) -> Hint {
        hints::VOTEPROOF
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_crypto::sign::{KeyKind, Privatekey};

    const NETWORK: &[u8] = b"isaac-test";

    fn init(prev: &[u8]) -> BallotFact {
        BallotFact::Init {
            height: Height(2),
            round: Round(0),
            previous_block: Hash::sha256(prev),
        }
    }

    fn vote(node: &str, fact: &BallotFact) -> VoteproofNodeFact {
        let key = Privatekey::generate(KeyKind::Btc);
        let hash = fact.generate_hash();
        VoteproofNodeFact {
            node: Address::new(node).unwrap(),
            signer: key.publickey(),
            signature: key.sign(hash.as_bytes(), NETWORK).unwrap(),
            fact: hash,
        }
    }

    fn suffrage(n: usize) -> Vec<Address> {
        (0..n).map(|i| Address::new(format!("n{i}")).unwrap()).collect()
    }

    #[test]
    fn test_threshold() {
        assert_eq!(Threshold::new(1, 100.0).unwrap().threshold(), 1);
        assert_eq!(Threshold::new(3, 67.0).unwrap().threshold(), 3);
        assert_eq!(Threshold::new(4, 67.0).unwrap().threshold(), 3);
        assert_eq!(Threshold::new(10, 66.0).unwrap().threshold(), 7);
        assert!(Threshold::new(0, 67.0).is_err());
        assert!(Threshold::new(3, 0.0).is_err());
        assert!(Threshold::new(3, 100.1).is_err());
    }

    #[test]
    fn test_find_majority() {
        let t = Threshold::new(4, 67.0).unwrap();
        assert_eq!(find_majority(&t, &[3]), (VoteResult::Majority, Some(0)));
        assert_eq!(find_majority(&t, &[1, 3]), (VoteResult::Majority, Some(1)));
        assert_eq!(find_majority(&t, &[2]), (VoteResult::NotYet, None));
        assert_eq!(find_majority(&t, &[2, 1]), (VoteResult::NotYet, None));
        assert_eq!(find_majority(&t, &[2, 2]), (VoteResult::Draw, None));
    }

    #[test]
    fn test_majority_voteproof_is_valid() {
        let fact = init(b"a");
        let votes = vec![vote("n0", &fact), vote("n1", &fact), vote("n2", &fact)];
        let vp = Voteproof::new(
            Height(2),
            Round(0),
            Stage::Init,
            67.0,
            suffrage(4),
            vec![fact.clone()],
            votes,
        )
        .unwrap();
        assert_eq!(vp.result(), VoteResult::Majority);
        assert_eq!(vp.majority(), Some(&fact));
        assert!(vp.is_valid(NETWORK).is_ok());
    }

    #[test]
    fn test_draw_voteproof() {
        let a = init(b"a");
        let b = init(b"b");
        let votes = vec![vote("n0", &a), vote("n1", &b)];
        let vp = Voteproof::new(
            Height(2),
            Round(0),
            Stage::Init,
            100.0,
            suffrage(2),
            vec![a, b],
            votes,
        )
        .unwrap();
        assert_eq!(vp.result(), VoteResult::Draw);
        assert!(vp.majority().is_none());
        assert!(vp.is_valid(NETWORK).is_ok());
    }

    #[test]
    fn test_rejects_outsider_and_bad_signature() {
        let fact = init(b"a");
        let vp = Voteproof::new(
            Height(2),
            Round(0),
            Stage::Init,
            100.0,
            suffrage(1),
            vec![fact.clone()],
            vec![vote("n9", &fact)],
        )
        .unwrap();
        assert!(matches!(
            vp.is_valid(NETWORK),
            Err(BallotError::NotInSuffrage { .. })
        ));

        let vp = Voteproof::new(
            Height(2),
            Round(0),
            Stage::Init,
            100.0,
            suffrage(1),
            vec![fact.clone()],
            vec![vote("n0", &fact)],
        )
        .unwrap();
        assert!(matches!(
            vp.is_valid(b"other-network"),
            Err(BallotError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_not_yet_is_invalid() {
        let fact = init(b"a");
        let vp = Voteproof::new(
            Height(2),
            Round(0),
            Stage::Init,
            100.0,
            suffrage(3),
            vec![fact.clone()],
            vec![vote("n0", &fact)],
        )
        .unwrap();
        assert_eq!(vp.result(), VoteResult::NotYet);
        assert!(vp.is_valid(NETWORK).is_err());
    }
}
