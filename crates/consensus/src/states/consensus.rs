// Path: crates/consensus/src/states/consensus.rs
//! Live consensus on the height above the local head.
//!
//! A round opens with a MAJORITY INIT voteproof. The proposer builds a
//! proposal from staged operation seals; everyone else waits for it up to
//! `timeout_waiting_proposal`. Once the proposal is processed, acting nodes
//! sign it at once and vote ACCEPT after `wait_broadcasting_accept_ballot`.
//! An ACCEPT MAJORITY stores the block and opens the next height. DRAWs and
//! timeouts move to the next round; a voteproof from a higher height sends
//! the node to SYNCING.

use super::{on_head, Context, Outcome, StateHandler, Switch, TimerId, Timers};
use crate::metrics::error_metrics;
use async_trait::async_trait;
use isaac_api::consensus::StateKind;
use isaac_api::storage::SealOrder;
use isaac_types::app::{
    Ballot, BallotFact, Hash, Height, Manifest, Round, Stage, VoteResult, Voteproof,
};
use isaac_types::error::{ErrorCode, ErrorKind, IsaacError, ProcessorError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Consensus {
    ctx: Arc<Context>,
    timers: Timers,
    entering: Option<Voteproof>,
    head: Option<Manifest>,
    /// The round being voted on, or waited for.
    round: Round,
    /// MAJORITY INIT voteproof of the open round.
    init: Option<Voteproof>,
    proposal: Option<Ballot>,
    /// Re-broadcast while waiting for the next INIT voteproof.
    init_ballot: Option<Ballot>,
    accept_ballot: Option<Ballot>,
}

impl Consensus {
    pub(crate) fn new(ctx: Arc<Context>, voteproof: Voteproof) -> Self {
        let timers = ctx.timers();
        Self {
            ctx,
            timers,
            entering: Some(voteproof),
            head: None,
            round: Round::ZERO,
            init: None,
            proposal: None,
            init_ballot: None,
            accept_ballot: None,
        }
    }

    fn head(&self) -> Result<&Manifest, IsaacError> {
        self.head
            .as_ref()
            .ok_or_else(|| IsaacError::Invariant("consensus without a head".into()))
    }

    fn height(&self) -> Result<Height, IsaacError> {
        Ok(self.head()?.height().next())
    }

    fn open_round(&self) -> Option<Round> {
        self.init.as_ref().map(Voteproof::round)
    }

    fn reset_round(&mut self) {
        self.timers.stop_all();
        self.init = None;
        self.proposal = None;
        self.init_ballot = None;
        self.accept_ballot = None;
    }

    /// Enters the round opened by a MAJORITY INIT voteproof.
    async fn open(&mut self, init: Voteproof) -> Outcome {
        let init = match on_head(self.head()?, init) {
            Ok(init) => init,
            Err(resync) => return Ok(Some(resync)),
        };
        self.ctx.database.new_init_voteproof(&init).await?;

        self.reset_round();
        let (height, round) = (init.height(), init.round());
        self.round = round;
        self.init = Some(init);

        let acting = self.ctx.suffrage.acting(height, round);
        tracing::info!(
            target: "consensus",
            event = "round_opened",
            height = height.0,
            round = round.0,
            proposer = %acting.proposer,
            "round opened"
        );

        if acting.proposer == *self.ctx.local.address() {
            let proposal = self.propose(height, round).await?;
            return self.process(proposal).await;
        }
        if let Some(proposal) = self.ctx.database.proposal(height, round).await? {
            return self.process(proposal).await;
        }
        let timeout = self.ctx.policy.get().timeout_waiting_proposal;
        self.timers.start(TimerId::WaitProposal, timeout, None);
        Ok(None)
    }

    /// Builds, stores and broadcasts the local proposal of `(height, round)`.
    async fn propose(&mut self, height: Height, round: Round) -> Result<Ballot, IsaacError> {
        let db = self.ctx.database.clone();
        let local = self.ctx.local.address().clone();
        if let Some(stored) = db.proposal(height, round).await? {
            if *stored.node() == local {
                self.broadcast_proposal(&stored);
                return Ok(stored);
            }
        }

        let max = self.ctx.policy.get().max_operations_in_proposal;
        let mut seen: HashSet<Hash> = HashSet::new();
        let mut operations = Vec::new();
        let mut seals = Vec::new();
        'seals: for seal in db.staged_operation_seals(SealOrder::Oldest).await? {
            let mut used = false;
            for op in seal.operations() {
                if operations.len() >= max {
                    break 'seals;
                }
                let fact = op.fact_hash();
                if seen.contains(fact) || db.has_operation(fact).await? {
                    continue;
                }
                seen.insert(fact.clone());
                operations.push(fact.clone());
                used = true;
            }
            if used {
                seals.push(seal.hash().clone());
            }
        }

        let proposal = self.ctx.local.ballot(
            BallotFact::Proposal {
                height,
                round,
                proposer: local,
                operations,
                seals,
            },
            self.init.clone(),
        )?;
        db.new_proposal(&proposal).await?;
        tracing::info!(
            target: "consensus",
            event = "proposal_created",
            height = height.0,
            round = round.0,
            proposal = %proposal.fact_hash(),
            "proposal created"
        );
        self.broadcast_proposal(&proposal);
        Ok(proposal)
    }

    fn broadcast_proposal(&mut self, proposal: &Ballot) {
        self.ctx.broadcast(proposal.clone().into());
        let interval = self.ctx.policy.get().interval_broadcasting_proposal;
        self.timers
            .start(TimerId::BroadcastProposal, interval, Some(interval));
    }

    /// Runs the proposal through the processor and signs the result.
    async fn process(&mut self, proposal: Ballot) -> Outcome {
        if self.proposal.as_ref().map(Ballot::fact_hash) == Some(proposal.fact_hash()) {
            return Ok(None);
        }
        let Some(init) = self.init.clone() else {
            return Ok(None);
        };
        self.timers.stop(TimerId::WaitProposal);
        self.proposal = Some(proposal.clone());

        let manifest = match self
            .ctx
            .processor
            .process_init(proposal.fact_hash(), &init)
            .await
        {
            Ok(manifest) => manifest,
            Err(e) => return self.processing_failed(e),
        };

        let policy = self.ctx.policy.get();
        let (height, round) = (init.height(), init.round());
        if self.ctx.is_acting(height, round) {
            let sign = self.ctx.local.ballot(
                BallotFact::Sign {
                    height,
                    round,
                    proposal: proposal.fact_hash().clone(),
                    new_block: manifest.hash().clone(),
                },
                Some(init.clone()),
            )?;
            self.ctx.publish(&sign)?;
            self.accept_ballot = Some(self.ctx.local.ballot(
                BallotFact::Accept {
                    height,
                    round,
                    proposal: proposal.fact_hash().clone(),
                    new_block: manifest.hash().clone(),
                },
                Some(init),
            )?);
            self.timers.start(
                TimerId::BroadcastAccept,
                policy.wait_broadcasting_accept_ballot,
                Some(policy.interval_broadcasting_accept_ballot),
            );
        }
        self.timers.start(
            TimerId::WaitAccept,
            policy.wait_broadcasting_accept_ballot + policy.timeout_waiting_proposal,
            None,
        );
        Ok(None)
    }

    fn processing_failed(&mut self, e: ProcessorError) -> Outcome {
        let e = IsaacError::from(e);
        let kind = e.kind();
        error_metrics().inc_error(kind.as_str(), e.code());
        tracing::warn!(
            target: "consensus",
            height = self.height().map(|h| h.0).unwrap_or_default(),
            round = self.round.0,
            kind = kind.as_str(),
            error = %e,
            "proposal not processed"
        );
        match kind {
            ErrorKind::Fatal => Ok(Some(Switch::Broken(e.to_string()))),
            ErrorKind::Transient => Ok(Some(Switch::Syncing {
                target: self.head()?.height(),
                voteproof: None,
            })),
            _ => {
                let timeout = self.ctx.policy.get().timeout_waiting_proposal;
                self.timers.start(TimerId::WaitProposal, timeout, None);
                Ok(None)
            }
        }
    }

    /// Leaves the open round and broadcasts INIT for `(height, round)`.
    async fn next_round(&mut self, height: Height, round: Round, voteproof: Voteproof) -> Outcome {
        self.reset_round();
        self.ctx.processor.cancel().await;
        self.round = round;
        tracing::info!(
            target: "consensus",
            event = "next_round",
            height = height.0,
            round = round.0,
            "moving to next round"
        );
        if !self.ctx.is_acting(height, round) {
            return Ok(None);
        }
        let ballot = self.ctx.local.ballot(
            BallotFact::Init {
                height,
                round,
                previous_block: self.head()?.hash().clone(),
            },
            Some(voteproof),
        )?;
        self.init_ballot = Some(ballot);
        let interval = self.ctx.policy.get().interval_broadcasting_init_ballot;
        self.timers
            .start(TimerId::BroadcastInit, Duration::ZERO, Some(interval));
        Ok(None)
    }

    /// An ACCEPT MAJORITY at the current height.
    async fn accepted(&mut self, accept: Voteproof) -> Outcome {
        let Some(proposal) = accept.majority().and_then(BallotFact::proposal).cloned() else {
            return Ok(None);
        };
        self.timers.stop_all();
        let (height, round) = (accept.height(), accept.round());

        match self.ctx.processor.process_accept(&proposal, &accept).await {
            Ok(block) => {
                tracing::info!(
                    target: "consensus",
                    event = "block_committed",
                    height = height.0,
                    round = round.0,
                    block = %block.hash(),
                    operations = block.operations.len(),
                    "block committed"
                );
                self.head = Some(block.manifest);
                self.next_round(height.next(), Round::ZERO, accept).await
            }
            Err(e) => {
                let e = IsaacError::from(e);
                let kind = e.kind();
                error_metrics().inc_error(kind.as_str(), e.code());
                tracing::warn!(
                    target: "consensus",
                    height = height.0,
                    round = round.0,
                    kind = kind.as_str(),
                    error = %e,
                    "accepted block not stored"
                );
                if kind == ErrorKind::Fatal {
                    return Ok(Some(Switch::Broken(e.to_string())));
                }
                if self.ctx.suffrage.nodes().len() == 1 {
                    return self.next_round(height, round.next(), accept).await;
                }
                Ok(Some(Switch::Syncing {
                    target: height,
                    voteproof: Some(accept),
                }))
            }
        }
    }
}

#[async_trait]
impl StateHandler for Consensus {
    fn kind(&self) -> StateKind {
        StateKind::Consensus
    }

    async fn enter(&mut self) -> Outcome {
        let head = self
            .ctx
            .database
            .last_manifest()
            .await?
            .ok_or_else(|| IsaacError::Invariant("consensus without a block".into()))?;
        self.head = Some(head);
        match self.entering.take() {
            Some(init) => self.open(init).await,
            None => Ok(None),
        }
    }

    async fn exit(&mut self) {
        self.reset_round();
        self.ctx.processor.cancel().await;
    }

    async fn voteproof(&mut self, voteproof: Voteproof) -> Outcome {
        let next = self.height()?;
        let (height, round) = (voteproof.height(), voteproof.round());
        if height < next {
            return Ok(None);
        }

        match (voteproof.stage(), voteproof.result()) {
            (Stage::Init, _) if height > next => Ok(Some(Switch::Syncing {
                target: height.prev(),
                voteproof: Some(voteproof),
            })),
            (Stage::Accept, VoteResult::Majority) if height > next => Ok(Some(Switch::Syncing {
                target: height,
                voteproof: Some(voteproof),
            })),
            (_, _) if height > next => Ok(None),
            (Stage::Init, VoteResult::Majority) => {
                let stale = match self.open_round() {
                    Some(open) => round <= open,
                    None => round < self.round,
                };
                if stale {
                    return Ok(None);
                }
                self.open(voteproof).await
            }
            (Stage::Accept, VoteResult::Majority) => self.accepted(voteproof).await,
            (Stage::Init | Stage::Accept, VoteResult::Draw) if round >= self.round => {
                self.next_round(height, round.next(), voteproof).await
            }
            _ => Ok(None),
        }
    }

    async fn proposal(&mut self, proposal: Ballot) -> Outcome {
        let open = self
            .init
            .as_ref()
            .map(|init| (init.height(), init.round()));
        if open != Some((proposal.height(), proposal.round())) {
            return Ok(None);
        }
        self.process(proposal).await
    }

    async fn timer(&mut self, id: TimerId, generation: u64) -> Outcome {
        if !self.timers.fire(id, generation) {
            return Ok(None);
        }
        match id {
            TimerId::BroadcastInit => {
                if let Some(ballot) = &self.init_ballot {
                    self.ctx.publish(ballot)?;
                }
                Ok(None)
            }
            TimerId::BroadcastProposal => {
                if let Some(proposal) = &self.proposal {
                    if proposal.node() == self.ctx.local.address() {
                        self.ctx.broadcast(proposal.clone().into());
                    }
                }
                Ok(None)
            }
            TimerId::BroadcastAccept => {
                if let Some(ballot) = &self.accept_ballot {
                    self.ctx.publish(ballot)?;
                }
                Ok(None)
            }
            TimerId::WaitProposal | TimerId::WaitAccept => {
                let Some(init) = self.init.clone() else {
                    return Ok(None);
                };
                tracing::debug!(target: "consensus", timer = %id, height = init.height().0, round = init.round().0, "round timed out");
                self.next_round(init.height(), init.round().next(), init).await
            }
            TimerId::RetrySync => Ok(None),
        }
    }
}
