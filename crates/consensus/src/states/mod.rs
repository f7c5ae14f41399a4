// Path: crates/consensus/src/states/mod.rs
//! The consensus state machine.
//!
//! One task owns the current state handler and feeds it from a single event
//! queue: voteproofs emitted by the ballotbox, proposals, timer ticks and
//! syncer results. A handler answers an event with an optional [`Switch`].
//! The task then exits the old handler, which aborts its timers and any
//! work it spawned, publishes the new [`StateKind`] and enters the next
//! handler. Handlers never run concurrently.

mod booting;
mod broken;
mod consensus;
mod joining;
mod syncing;
mod timers;

pub use timers::TimerId;
pub(crate) use timers::Timers;

use crate::ballotbox::Ballotbox;
use crate::local::{LocalNode, LocalPolicy};
use crate::metrics::{error_metrics, metrics};
use crate::syncer::Syncer;
use async_trait::async_trait;
use isaac_api::blockdata::BlockData;
use isaac_api::consensus::{ProposalProcessor, StateKind, Suffrage};
use isaac_api::storage::Database;
use isaac_networking::Nodepool;
use isaac_types::app::{Ballot, BallotFact, Hash, Height, Manifest, Round, Seal, Voteproof};
use isaac_types::config::GenesisOperation;
use isaac_types::error::{ErrorCode, ErrorKind, IsaacError};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Capacity of the event queue of one node.
pub const EVENT_QUEUE_SIZE: usize = 1024;

/// Input of the state machine.
#[derive(Debug)]
pub enum Event {
    Voteproof(Voteproof),
    Proposal(Ballot),
    Timer { id: TimerId, generation: u64 },
    Synced {
        run: u64,
        result: Result<Height, IsaacError>,
    },
}

/// A requested transition with the arguments of the next state.
#[derive(Debug)]
pub(crate) enum Switch {
    Joining(Option<Voteproof>),
    /// Carries the MAJORITY INIT voteproof that opens the round.
    Consensus(Voteproof),
    Syncing {
        target: Height,
        voteproof: Option<Voteproof>,
    },
    Broken(String),
}

impl Switch {
    fn kind(&self) -> StateKind {
        match self {
            Self::Joining(_) => StateKind::Joining,
            Self::Consensus(_) => StateKind::Consensus,
            Self::Syncing { .. } => StateKind::Syncing,
            Self::Broken(_) => StateKind::Broken,
        }
    }
}

pub(crate) type Outcome = Result<Option<Switch>, IsaacError>;

#[async_trait]
pub(crate) trait StateHandler: Send {
    fn kind(&self) -> StateKind;

    async fn enter(&mut self) -> Outcome;

    async fn exit(&mut self) {}

    async fn voteproof(&mut self, _voteproof: Voteproof) -> Outcome {
        Ok(None)
    }

    async fn proposal(&mut self, _proposal: Ballot) -> Outcome {
        Ok(None)
    }

    async fn timer(&mut self, _id: TimerId, _generation: u64) -> Outcome {
        Ok(None)
    }

    async fn synced(&mut self, _run: u64, _result: Result<Height, IsaacError>) -> Outcome {
        Ok(None)
    }
}

/// Everything the state handlers share.
pub struct Context {
    pub(crate) local: Arc<LocalNode>,
    pub(crate) policy: Arc<LocalPolicy>,
    pub(crate) suffrage: Arc<dyn Suffrage>,
    pub(crate) database: Arc<dyn Database>,
    pub(crate) blockdata: Arc<dyn BlockData>,
    pub(crate) nodepool: Arc<Nodepool>,
    pub(crate) ballotbox: Arc<Ballotbox>,
    pub(crate) processor: Arc<dyn ProposalProcessor>,
    pub(crate) syncer: Arc<Syncer>,
    pub(crate) genesis: Vec<GenesisOperation>,
    pub(crate) events: mpsc::Sender<Event>,
    timer_sequence: Arc<AtomicU64>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: Arc<LocalNode>,
        policy: Arc<LocalPolicy>,
        suffrage: Arc<dyn Suffrage>,
        database: Arc<dyn Database>,
        blockdata: Arc<dyn BlockData>,
        nodepool: Arc<Nodepool>,
        ballotbox: Arc<Ballotbox>,
        processor: Arc<dyn ProposalProcessor>,
        genesis: Vec<GenesisOperation>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let syncer = Arc::new(Syncer::new(
            local.network_id().to_vec(),
            database.clone(),
            blockdata.clone(),
            nodepool.clone(),
        ));
        Self {
            local,
            policy,
            suffrage,
            database,
            blockdata,
            nodepool,
            ballotbox,
            processor,
            syncer,
            genesis,
            events,
            timer_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A number unique among timers and sync runs of this node.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.timer_sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    pub(crate) fn timers(&self) -> Timers {
        Timers::new(self.events.clone(), self.timer_sequence.clone())
    }

    /// Queues `event` without waiting. A full queue drops it; ballots are
    /// re-broadcast, so the voteproof is produced again later.
    pub(crate) fn post(&self, event: Event) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(target: "consensus", ?event, "event queue full, dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Votes `ballot` into the local ballotbox and queues a finished
    /// voteproof.
    pub(crate) fn vote(&self, ballot: &Ballot) -> Result<(), IsaacError> {
        if let (_, Some(voteproof)) = self.ballotbox.vote(ballot)? {
            self.post(Event::Voteproof(voteproof));
        }
        Ok(())
    }

    /// Sends `seal` to every peer in the background.
    pub(crate) fn broadcast(&self, seal: Seal) {
        let nodepool = self.nodepool.clone();
        tokio::spawn(async move {
            nodepool.broadcast(&seal).await;
        });
    }

    /// Votes a local ballot and sends it to every peer.
    pub(crate) fn publish(&self, ballot: &Ballot) -> Result<(), IsaacError> {
        self.vote(ballot)?;
        self.broadcast(ballot.clone().into());
        Ok(())
    }

    pub(crate) fn is_acting(&self, height: Height, round: Round) -> bool {
        self.suffrage
            .is_acting(height, round, self.local.address())
    }
}

/// The previous block a MAJORITY INIT voteproof agreed on.
pub(crate) fn agreed_previous_block(voteproof: &Voteproof) -> Option<&Hash> {
    match voteproof.majority() {
        Some(BallotFact::Init { previous_block, .. }) => Some(previous_block),
        _ => None,
    }
}

/// Passes a MAJORITY INIT voteproof for `head + 1` through when the network
/// agreed on `head` as its previous block. Otherwise the node resyncs the
/// height below it, handing the voteproof over.
pub(crate) fn on_head(head: &Manifest, init: Voteproof) -> Result<Voteproof, Switch> {
    if agreed_previous_block(&init) == Some(head.hash()) {
        return Ok(init);
    }
    tracing::warn!(target: "consensus", height = head.height().0, block = %head.hash(), "network agreed on another previous block");
    Err(Switch::Syncing {
        target: init.height().prev(),
        voteproof: Some(init),
    })
}

fn handler(ctx: &Arc<Context>, switch: Switch) -> Box<dyn StateHandler> {
    match switch {
        Switch::Joining(voteproof) => Box::new(joining::Joining::new(ctx.clone(), voteproof)),
        Switch::Consensus(voteproof) => {
            Box::new(consensus::Consensus::new(ctx.clone(), voteproof))
        }
        Switch::Syncing { target, voteproof } => {
            Box::new(syncing::Syncing::new(ctx.clone(), target, voteproof))
        }
        Switch::Broken(reason) => Box::new(broken::Broken::new(reason)),
    }
}

/// Turns a handler error into a transition. Fatal errors break the node. A
/// transient failure in JOINING or CONSENSUS may have left the round
/// unopened, so the node resyncs from its head; anything else is logged and
/// the state carries on.
async fn settle(ctx: &Context, state: StateKind, outcome: Outcome) -> Option<Switch> {
    let e = match outcome {
        Ok(switch) => return switch,
        Err(e) => e,
    };
    let kind = e.kind();
    error_metrics().inc_error(kind.as_str(), e.code());
    match kind {
        ErrorKind::Fatal => Some(Switch::Broken(e.to_string())),
        ErrorKind::Transient if matches!(state, StateKind::Joining | StateKind::Consensus) => {
            let target = match ctx.database.last_manifest().await {
                Ok(Some(head)) => head.height(),
                _ => Height::NIL,
            };
            tracing::warn!(target: "consensus", state = %state, error = %e, target_height = target.0, "state handler timed out, syncing");
            Some(Switch::Syncing {
                target,
                voteproof: None,
            })
        }
        _ => {
            tracing::warn!(target: "consensus", state = %state, kind = kind.as_str(), error = %e, "state handler failed");
            None
        }
    }
}

/// The task driving one node's state handlers.
pub struct StateMachine {
    ctx: Arc<Context>,
    events: mpsc::Receiver<Event>,
    state: watch::Sender<StateKind>,
    stop: watch::Receiver<bool>,
}

impl StateMachine {
    pub fn new(
        ctx: Arc<Context>,
        events: mpsc::Receiver<Event>,
        state: watch::Sender<StateKind>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            events,
            state,
            stop,
        }
    }

    fn publish(state: &watch::Sender<StateKind>, from: StateKind, to: StateKind) {
        state.send_replace(to);
        metrics().set_state(to.as_str());
        tracing::info!(
            target: "consensus",
            event = "state_switched",
            from = %from,
            to = %to,
            "state switched"
        );
    }

    async fn dispatch(ctx: &Context, current: &mut dyn StateHandler, event: Event) -> Option<Switch> {
        let outcome = match event {
            Event::Voteproof(vp) => current.voteproof(vp).await,
            Event::Proposal(p) => current.proposal(p).await,
            Event::Timer { id, generation } => current.timer(id, generation).await,
            Event::Synced { run, result } => current.synced(run, result).await,
        };
        settle(ctx, current.kind(), outcome).await
    }

    /// Runs until stopped. Starts in BOOTING.
    pub async fn run(self) {
        let Self {
            ctx,
            mut events,
            state,
            mut stop,
        } = self;

        let mut current: Box<dyn StateHandler> = Box::new(booting::Booting::new(ctx.clone()));
        Self::publish(&state, StateKind::Booting, StateKind::Booting);
        let outcome = current.enter().await;
        let mut next = settle(&ctx, current.kind(), outcome).await;

        loop {
            while let Some(switch) = next.take() {
                let (from, to) = (current.kind(), switch.kind());
                current.exit().await;
                current = handler(&ctx, switch);
                Self::publish(&state, from, to);
                let outcome = current.enter().await;
                next = settle(&ctx, current.kind(), outcome).await;
            }

            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => next = Self::dispatch(&ctx, current.as_mut(), event).await,
                    None => break,
                },
            }
        }

        current.exit().await;
        tracing::info!(target: "consensus", state = %current.kind(), "state machine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_test_utils::fixtures::{self, TestNode};

    fn init(nodes: &[TestNode], height: Height, previous_block: Hash) -> Voteproof {
        fixtures::voteproof(
            nodes,
            BallotFact::Init {
                height,
                round: Round(0),
                previous_block,
            },
        )
    }

    #[test]
    fn test_init_on_local_head_opens_round() {
        let nodes = TestNode::many(3);
        let chain = fixtures::chain(&nodes, 2);
        let head = &chain[1].manifest;
        let vp = init(&nodes, Height(2), head.hash().clone());
        assert!(matches!(on_head(head, vp), Ok(vp) if vp.height() == Height(2)));
    }

    #[test]
    fn test_init_on_foreign_previous_block_resyncs_below() {
        let nodes = TestNode::many(3);
        let chain = fixtures::chain(&nodes, 2);
        let head = &chain[1].manifest;
        let vp = init(&nodes, Height(2), chain[0].hash().clone());
        match on_head(head, vp) {
            Err(Switch::Syncing {
                target,
                voteproof: Some(vp),
            }) => {
                assert_eq!(target, Height(1));
                assert_eq!(vp.height(), Height(2));
                assert_eq!(vp.stage(), isaac_types::app::Stage::Init);
            }
            other => panic!("expected a resync below the head, got {other:?}"),
        }
    }
}
