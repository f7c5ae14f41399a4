// Path: crates/storage/src/metrics.rs
use isaac_telemetry::sinks::StorageMetricsSink;

pub fn metrics() -> &'static dyn StorageMetricsSink {
    isaac_telemetry::storage_metrics()
}
