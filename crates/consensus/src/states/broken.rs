// Path: crates/consensus/src/states/broken.rs
use super::{Outcome, StateHandler};
use async_trait::async_trait;
use isaac_api::consensus::StateKind;

/// Terminal within a run. Every event is dropped; the node keeps serving
/// reads to its peers.
pub(crate) struct Broken {
    reason: String,
}

impl Broken {
    pub(crate) fn new(reason: String) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl StateHandler for Broken {
    fn kind(&self) -> StateKind {
        StateKind::Broken
    }

    async fn enter(&mut self) -> Outcome {
        tracing::error!(target: "consensus", event = "broken", reason = %self.reason, "node is broken, voting stopped");
        Ok(None)
    }
}
