// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, GaugeVec, Histogram, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// Initialized exactly once by `install`.

static STORAGE_BLOCKS_STORED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORAGE_BYTES_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORAGE_COMMIT_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static STORAGE_BLOCKDATA_PURGED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_VOTEPROOFS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CONSENSUS_STATE: OnceCell<GaugeVec> = OnceCell::new();
static CONSENSUS_EQUIVOCATIONS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_PROPOSAL_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

const STATES: [&str; 5] = ["BOOTING", "JOINING", "CONSENSUS", "SYNCING", "BROKEN"];

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Resolves a collector, skipping the observation when `install()` has not
/// run yet.
macro_rules! get_metric {
    ($metric:ident) => {
        match $metric.get() {
            Some(m) => m,
            None => return,
        }
    };
}

impl StorageMetricsSink for PrometheusSink {
    fn inc_blocks_stored(&self) {
        get_metric!(STORAGE_BLOCKS_STORED_TOTAL).inc();
    }
    fn inc_bytes_written_total(&self, bytes: u64) {
        get_metric!(STORAGE_BYTES_WRITTEN_TOTAL).inc_by(bytes);
    }
    fn observe_commit_duration(&self, duration_secs: f64) {
        get_metric!(STORAGE_COMMIT_DURATION_SECONDS).observe(duration_secs);
    }
    fn inc_blockdata_purged(&self, count: u64) {
        get_metric!(STORAGE_BLOCKDATA_PURGED_TOTAL).inc_by(count);
    }
}

impl ConsensusMetricsSink for PrometheusSink {
    fn inc_voteproofs(&self, stage: &str, result: &str) {
        get_metric!(CONSENSUS_VOTEPROOFS_TOTAL)
            .with_label_values(&[stage, result])
            .inc();
    }
    fn set_state(&self, state: &str) {
        let gauge = get_metric!(CONSENSUS_STATE);
        for s in STATES {
            gauge
                .with_label_values(&[s])
                .set(if s == state { 1.0 } else { 0.0 });
        }
    }
    fn inc_equivocations(&self) {
        get_metric!(CONSENSUS_EQUIVOCATIONS_TOTAL).inc();
    }
    fn observe_proposal_processing(&self, duration_secs: f64) {
        get_metric!(CONSENSUS_PROPOSAL_DURATION_SECONDS).observe(duration_secs);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, code: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, code])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    STORAGE_BLOCKS_STORED_TOTAL
        .set(register_int_counter!(
            "isaac_storage_blocks_stored_total",
            "Total number of blocks committed to the database."
        )?)
        .expect("static already initialized");
    STORAGE_BYTES_WRITTEN_TOTAL
        .set(register_int_counter!(
            "isaac_storage_bytes_written_total",
            "Total compressed bytes written as block data."
        )?)
        .expect("static already initialized");
    STORAGE_COMMIT_DURATION_SECONDS
        .set(register_histogram!(
            "isaac_storage_commit_duration_seconds",
            "Latency of one block commit transaction.",
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .expect("static already initialized");
    STORAGE_BLOCKDATA_PURGED_TOTAL
        .set(register_int_counter!(
            "isaac_storage_blockdata_purged_total",
            "Total block data directories purged by the cleaner."
        )?)
        .expect("static already initialized");
    CONSENSUS_VOTEPROOFS_TOTAL
        .set(register_int_counter_vec!(
            "isaac_consensus_voteproofs_total",
            "Total voteproofs emitted by the ballotbox.",
            &["stage", "result"]
        )?)
        .expect("static already initialized");
    CONSENSUS_STATE
        .set(register_gauge_vec!(
            "isaac_consensus_state",
            "Current consensus state of the node (1 if active, 0 otherwise).",
            &["state"]
        )?)
        .expect("static already initialized");
    CONSENSUS_EQUIVOCATIONS_TOTAL
        .set(register_int_counter!(
            "isaac_consensus_equivocations_total",
            "Total equivocating ballots detected."
        )?)
        .expect("static already initialized");
    CONSENSUS_PROPOSAL_DURATION_SECONDS
        .set(register_histogram!(
            "isaac_consensus_proposal_processing_seconds",
            "Latency of processing one proposal.",
            exponential_buckets(0.002, 2.0, 15)?
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "isaac_errors_total",
            "Total number of errors, categorized by kind and code.",
            &["kind", "code"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
