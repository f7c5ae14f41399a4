// Path: crates/consensus/src/states/timers.rs
use super::Event;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The timers a state handler can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    BroadcastInit,
    BroadcastProposal,
    BroadcastAccept,
    WaitProposal,
    WaitAccept,
    RetrySync,
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BroadcastInit => "broadcast-init",
            Self::BroadcastProposal => "broadcast-proposal",
            Self::BroadcastAccept => "broadcast-accept",
            Self::WaitProposal => "wait-proposal",
            Self::WaitAccept => "wait-accept",
            Self::RetrySync => "retry-sync",
        };
        f.write_str(s)
    }
}

/// Timers owned by one state handler.
///
/// Each start gets a generation number that is unique across handlers. A
/// tick that was queued before its timer was stopped or restarted carries
/// an old generation and is dropped by [`Timers::fire`]. Dropping the set
/// aborts every timer task.
pub(crate) struct Timers {
    events: mpsc::Sender<Event>,
    sequence: Arc<AtomicU64>,
    running: HashMap<TimerId, (u64, JoinHandle<()>)>,
}

impl Timers {
    pub(crate) fn new(events: mpsc::Sender<Event>, sequence: Arc<AtomicU64>) -> Self {
        Self {
            events,
            sequence,
            running: HashMap::new(),
        }
    }

    /// Starts `id` after `delay`, repeating every `interval` when given.
    /// A running timer with the same id is replaced.
    pub(crate) fn start(&mut self, id: TimerId, delay: Duration, interval: Option<Duration>) {
        self.stop(id);
        let generation = self.sequence.fetch_add(1, Ordering::Relaxed);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            loop {
                if events.send(Event::Timer { id, generation }).await.is_err() {
                    return;
                }
                match interval {
                    Some(interval) => tokio::time::sleep(interval).await,
                    None => return,
                }
            }
        });
        self.running.insert(id, (generation, handle));
    }

    pub(crate) fn stop(&mut self, id: TimerId) {
        if let Some((_, handle)) = self.running.remove(&id) {
            handle.abort();
        }
    }

    pub(crate) fn stop_all(&mut self) {
        for (_, (_, handle)) in self.running.drain() {
            handle.abort();
        }
    }

    /// Whether a tick of `id` with `generation` belongs to a live timer.
    pub(crate) fn fire(&self, id: TimerId, generation: u64) -> bool {
        matches!(self.running.get(&id), Some((g, _)) if *g == generation)
    }

    pub(crate) fn is_running(&self, id: TimerId) -> bool {
        self.running.contains_key(&id)
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.stop_all();
    }
}
