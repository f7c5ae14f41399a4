// Path: crates/consensus/src/states/joining.rs
use super::{on_head, Context, Outcome, StateHandler, Switch, TimerId, Timers};
use async_trait::async_trait;
use isaac_api::consensus::StateKind;
use isaac_types::app::{Ballot, BallotFact, Manifest, Round, Stage, VoteResult, Voteproof};
use isaac_types::error::IsaacError;
use std::sync::Arc;
use std::time::Duration;

/// Waits for the network to open the height above the local head.
///
/// Acting nodes broadcast INIT for `head + 1` until an INIT voteproof
/// arrives. A voteproof from further ahead means the local chain is behind.
pub(crate) struct Joining {
    ctx: Arc<Context>,
    timers: Timers,
    entering: Option<Voteproof>,
    head: Option<Manifest>,
    round: Round,
    ballot: Option<Ballot>,
}

impl Joining {
    pub(crate) fn new(ctx: Arc<Context>, voteproof: Option<Voteproof>) -> Self {
        let timers = ctx.timers();
        Self {
            ctx,
            timers,
            entering: voteproof,
            head: None,
            round: Round::ZERO,
            ballot: None,
        }
    }

    fn head(&self) -> Result<&Manifest, IsaacError> {
        self.head
            .as_ref()
            .ok_or_else(|| IsaacError::Invariant("joining without a head".into()))
    }

    /// Signs INIT for `(head + 1, round)` carrying `voteproof` and starts
    /// broadcasting it. Non-acting nodes only listen.
    fn start_init(&mut self, round: Round, voteproof: Option<Voteproof>) -> Result<(), IsaacError> {
        let head = self.head()?;
        let height = head.height().next();
        let previous_block = head.hash().clone();
        self.round = round;
        self.ballot = None;
        self.timers.stop(TimerId::BroadcastInit);
        if !self.ctx.is_acting(height, round) {
            return Ok(());
        }
        self.ballot = Some(self.ctx.local.ballot(
            BallotFact::Init {
                height,
                round,
                previous_block,
            },
            voteproof,
        )?);
        let interval = self.ctx.policy.get().interval_broadcasting_init_ballot;
        self.timers
            .start(TimerId::BroadcastInit, Duration::ZERO, Some(interval));
        Ok(())
    }
}

#[async_trait]
impl StateHandler for Joining {
    fn kind(&self) -> StateKind {
        StateKind::Joining
    }

    async fn enter(&mut self) -> Outcome {
        let head = self
            .ctx
            .database
            .last_manifest()
            .await?
            .ok_or_else(|| IsaacError::Invariant("joining without a block".into()))?;
        tracing::info!(target: "consensus", height = head.height().0, block = %head.hash(), "joining");
        self.head = Some(head);

        let last_accept = self.ctx.database.last_voteproof(Stage::Accept).await?;
        self.start_init(Round::ZERO, last_accept)?;

        match self.entering.take() {
            Some(voteproof) => self.voteproof(voteproof).await,
            None => Ok(None),
        }
    }

    async fn exit(&mut self) {
        self.timers.stop_all();
    }

    async fn voteproof(&mut self, voteproof: Voteproof) -> Outcome {
        let head = self.head()?;
        let next = head.height().next();
        let height = voteproof.height();
        if height < next {
            return Ok(None);
        }

        match (voteproof.stage(), voteproof.result()) {
            (Stage::Init, _) if height > next => Ok(Some(Switch::Syncing {
                target: height.prev(),
                voteproof: Some(voteproof),
            })),
            (Stage::Init, VoteResult::Majority) => match on_head(head, voteproof) {
                Ok(init) => Ok(Some(Switch::Consensus(init))),
                Err(resync) => Ok(Some(resync)),
            },
            (Stage::Accept, VoteResult::Majority) => Ok(Some(Switch::Syncing {
                target: height,
                voteproof: Some(voteproof),
            })),
            (Stage::Init | Stage::Accept, VoteResult::Draw)
                if height == next && voteproof.round() >= self.round =>
            {
                tracing::debug!(target: "consensus", height = height.0, round = voteproof.round().0, "draw, next round");
                let round = voteproof.round().next();
                self.start_init(round, Some(voteproof))?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    async fn timer(&mut self, id: TimerId, generation: u64) -> Outcome {
        if id != TimerId::BroadcastInit || !self.timers.fire(id, generation) {
            return Ok(None);
        }
        if let Some(ballot) = &self.ballot {
            self.ctx.publish(ballot)?;
        }
        Ok(None)
    }
}
