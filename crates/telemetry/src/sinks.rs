// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured error metrics sink, or a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured consensus metrics sink, or a no-op sink.
pub fn consensus_metrics() -> &'static dyn ConsensusMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured storage metrics sink, or a no-op sink.
pub fn storage_metrics() -> &'static dyn StorageMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the database and the block data store.
pub trait StorageMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of blocks committed to the database.
    fn inc_blocks_stored(&self);
    /// Increments the total number of compressed bytes written as block data.
    fn inc_bytes_written_total(&self, bytes: u64);
    /// Observes the duration of one block commit transaction.
    fn observe_commit_duration(&self, duration_secs: f64);
    /// Increments the number of block data directories purged by the cleaner.
    fn inc_blockdata_purged(&self, count: u64);
}
impl StorageMetricsSink for NopSink {
    fn inc_blocks_stored(&self) {}
    fn inc_bytes_written_total(&self, _bytes: u64) {}
    fn observe_commit_duration(&self, _duration_secs: f64) {}
    fn inc_blockdata_purged(&self, _count: u64) {}
}

/// A sink for metrics related to the consensus state machine.
pub trait ConsensusMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of emitted voteproofs, labeled by stage and result.
    fn inc_voteproofs(&self, stage: &str, result: &str);
    /// Sets the state gauge so that only `state` reads 1.
    fn set_state(&self, state: &str);
    /// Increments the counter of detected equivocations.
    fn inc_equivocations(&self);
    /// Observes the duration of processing one proposal.
    fn observe_proposal_processing(&self, duration_secs: f64);
}
impl ConsensusMetricsSink for NopSink {
    fn inc_voteproofs(&self, _stage: &str, _result: &str) {}
    fn set_state(&self, _state: &str) {}
    fn inc_equivocations(&self) {}
    fn observe_proposal_processing(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and code.
    fn inc_error(&self, kind: &'static str, code: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _code: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink: StorageMetricsSink + ConsensusMetricsSink + ErrorMetricsSink {}

impl<T> MetricsSink for T where T: StorageMetricsSink + ConsensusMetricsSink + ErrorMetricsSink {}
