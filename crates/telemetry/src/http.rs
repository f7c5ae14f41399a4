// Path: crates/telemetry/src/http.rs
use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderName, StatusCode},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

/// What `/healthz` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    /// `false` answers 503.
    pub healthy: bool,
    /// One line per local node, e.g. `n0 CONSENSUS`.
    pub detail: String,
}

/// Produces the current [`Health`] on every `/healthz` request.
pub type HealthCheck = Arc<dyn Fn() -> Health + Send + Sync>;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(target: "telemetry", error = %e, "failed to encode metrics");
    }
    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buf.into(),
    )
}

async fn healthz_handler(State(check): State<HealthCheck>) -> (StatusCode, String) {
    let health = check();
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, health.detail)
}

async fn handle_service_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled internal error: {err}"),
        )
    }
}

/// The `/metrics` and `/healthz` routes.
pub fn router(health: HealthCheck) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(health)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_service_error))
                .layer(TraceLayer::new_for_http())
                .load_shed()
                .concurrency_limit(8)
                .timeout(Duration::from_secs(2)),
        )
}

/// Serves [`router`] on `addr` until `shutdown` resolves.
pub async fn run_server<F>(addr: SocketAddr, health: HealthCheck, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target: "telemetry", addr = %addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    if let Ok(local) = listener.local_addr() {
        tracing::info!(target: "telemetry", addr = %local, "metrics endpoint listening");
    }

    let served = axum::serve(listener, router(health).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await;
    if let Err(e) = served {
        tracing::error!(target: "telemetry", error = %e, "metrics endpoint failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_reflects_check() {
        let ok: HealthCheck = Arc::new(|| Health {
            healthy: true,
            detail: "n0 CONSENSUS".into(),
        });
        assert_eq!(
            healthz_handler(State(ok)).await,
            (StatusCode::OK, "n0 CONSENSUS".to_string())
        );

        let broken: HealthCheck = Arc::new(|| Health {
            healthy: false,
            detail: "n0 BROKEN".into(),
        });
        let (status, _) = healthz_handler(State(broken)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_are_text_format() {
        let ([(name, value)], _) = metrics_handler().await;
        assert_eq!(name, CONTENT_TYPE);
        assert!(value.starts_with("text/plain"));
    }
}
