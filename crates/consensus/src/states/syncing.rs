// Path: crates/consensus/src/states/syncing.rs
use super::{Context, Event, Outcome, StateHandler, Switch, TimerId, Timers};
use async_trait::async_trait;
use isaac_api::consensus::StateKind;
use isaac_types::app::{Height, Stage, Voteproof};
use isaac_types::error::{ErrorKind, IsaacError};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs the syncer until the local head reaches the target.
///
/// Voteproofs seen meanwhile only raise the target. The last of them is
/// handed to JOINING, which usually opens consensus right away.
pub(crate) struct Syncing {
    ctx: Arc<Context>,
    timers: Timers,
    target: Height,
    voteproof: Option<Voteproof>,
    task: Option<(u64, JoinHandle<()>)>,
}

impl Syncing {
    pub(crate) fn new(ctx: Arc<Context>, target: Height, voteproof: Option<Voteproof>) -> Self {
        let timers = ctx.timers();
        Self {
            ctx,
            timers,
            target,
            voteproof,
            task: None,
        }
    }

    fn run(&mut self) {
        if let Some((_, task)) = self.task.take() {
            task.abort();
        }
        let ctx = self.ctx.clone();
        let target = self.target;
        let run = ctx.next_sequence();
        let task = tokio::spawn(async move {
            let best = ctx.syncer.best_height().await;
            let result = ctx.syncer.sync(target.max(best)).await;
            // the machine may already be gone
            let _ = ctx.events.send(Event::Synced { run, result }).await;
        });
        self.task = Some((run, task));
    }

    /// The height a voteproof proves the network has reached.
    fn proven_height(voteproof: &Voteproof) -> Option<Height> {
        match voteproof.stage() {
            Stage::Init => Some(voteproof.height().prev()),
            Stage::Accept if voteproof.is_majority() => Some(voteproof.height()),
            _ => None,
        }
    }
}

#[async_trait]
impl StateHandler for Syncing {
    fn kind(&self) -> StateKind {
        StateKind::Syncing
    }

    async fn enter(&mut self) -> Outcome {
        tracing::info!(target: "consensus", target_height = self.target.0, "syncing");
        self.run();
        Ok(None)
    }

    async fn exit(&mut self) {
        if let Some((_, task)) = self.task.take() {
            task.abort();
        }
        self.timers.stop_all();
    }

    async fn voteproof(&mut self, voteproof: Voteproof) -> Outcome {
        let Some(height) = Self::proven_height(&voteproof) else {
            return Ok(None);
        };
        if height > self.target {
            tracing::debug!(target: "consensus", from = self.target.0, to = height.0, "sync target raised");
            self.target = height;
        }
        // JOINING gets the newest one, even when it proves nothing new
        let key = |vp: &Voteproof| (vp.height(), vp.round(), vp.stage());
        if height >= self.target
            && self
                .voteproof
                .as_ref()
                .map_or(true, |held| key(&voteproof) > key(held))
        {
            self.voteproof = Some(voteproof);
        }
        Ok(None)
    }

    async fn timer(&mut self, id: TimerId, generation: u64) -> Outcome {
        if id == TimerId::RetrySync && self.timers.fire(id, generation) {
            self.timers.stop(id);
            self.run();
        }
        Ok(None)
    }

    async fn synced(&mut self, run: u64, result: Result<Height, IsaacError>) -> Outcome {
        if !matches!(self.task, Some((current, _)) if current == run) {
            return Ok(None);
        }
        self.task = None;
        match result {
            Ok(head) if head >= self.target => {
                tracing::info!(target: "consensus", height = head.0, "caught up");
                Ok(Some(Switch::Joining(self.voteproof.take())))
            }
            Ok(head) => {
                tracing::debug!(target: "consensus", height = head.0, target_height = self.target.0, "sync continues");
                self.run();
                Ok(None)
            }
            Err(e) if e.kind() == ErrorKind::Fatal => {
                Ok(Some(Switch::Broken(format!("sync failed: {e}"))))
            }
            Err(e) => {
                tracing::warn!(target: "consensus", target_height = self.target.0, error = %e, "sync failed, retrying");
                let interval = self.ctx.policy.get().interval_broadcasting_init_ballot;
                self.timers.start(TimerId::RetrySync, interval, None);
                Ok(None)
            }
        }
    }
}
