// Path: crates/consensus/src/metrics.rs
use isaac_telemetry::sinks::{ConsensusMetricsSink, ErrorMetricsSink};

pub fn metrics() -> &'static dyn ConsensusMetricsSink {
    isaac_telemetry::consensus_metrics()
}

pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    isaac_telemetry::error_metrics()
}
