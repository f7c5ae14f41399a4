// Path: crates/telemetry/src/time.rs
use crate::sinks::{ConsensusMetricsSink, StorageMetricsSink};
use std::time::{Duration, Instant};

/// Reports the time spent in a scope, in seconds, when dropped.
pub struct ScopeTimer<F: FnMut(f64)> {
    observe: F,
    start: Instant,
}

impl<F: FnMut(f64)> ScopeTimer<F> {
    pub fn new(observe: F) -> Self {
        Self {
            observe,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F: FnMut(f64)> Drop for ScopeTimer<F> {
    fn drop(&mut self) {
        (self.observe)(self.start.elapsed().as_secs_f64());
    }
}

/// Times one proposal through the processor.
pub fn proposal_processing(sink: &dyn ConsensusMetricsSink) -> ScopeTimer<impl FnMut(f64) + '_> {
    ScopeTimer::new(move |secs| sink.observe_proposal_processing(secs))
}

/// Times one block commit transaction.
pub fn block_commit(sink: &dyn StorageMetricsSink) -> ScopeTimer<impl FnMut(f64) + '_> {
    ScopeTimer::new(move |secs| sink.observe_commit_duration(secs))
}
