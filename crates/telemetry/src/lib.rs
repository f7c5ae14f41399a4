// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # ISAAC Telemetry
//!
//! Structured JSON logging, a Prometheus metrics endpoint and abstract sinks
//! that decouple metric instrumentation from the backend.

/// The `/metrics` and `/healthz` endpoint.
pub mod http;
/// Global subscriber setup, JSON or text.
pub mod init;
/// The concrete implementation of metrics sinks using the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics reporting.
pub mod sinks;
/// Scope timers feeding the duration histograms.
pub mod time;

pub use sinks::{consensus_metrics, error_metrics, storage_metrics};
