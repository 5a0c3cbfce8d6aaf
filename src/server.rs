//! Operator HTTP surface
//!
//! Three endpoints on the operator port: a liveness probe that always
//! answers, a readiness probe that round-trips the telemetry backend under a
//! short timeout, and the Prometheus metrics exposition. The router carries
//! its dependencies as axum state so tests can drive it with mock telemetry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::metrics::ControllerMetrics;
use crate::telemetry::TelemetryQuerier;

/// Budget for the readiness round-trip to the telemetry backend
const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe query proving the telemetry backend answers at all
const READINESS_QUERY: &str = "up";

/// Dependencies of the operator endpoints
#[derive(Clone)]
pub struct OperatorState {
    /// Telemetry backend probed by the readiness endpoint
    pub telemetry: Arc<dyn TelemetryQuerier>,
    /// Metric registry served by the exposition endpoint
    pub metrics: Arc<ControllerMetrics>,
}

/// Build the operator router
pub fn operator_router(state: OperatorState) -> Router {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics_exposition))
        .with_state(state)
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": concat!("v", env!("CARGO_PKG_VERSION")),
    }))
}

async fn readiness(State(state): State<OperatorState>) -> Response {
    let probe = tokio::time::timeout(READINESS_TIMEOUT, state.telemetry.query(READINESS_QUERY));

    let error = match probe.await {
        Ok(Ok(_)) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "status": "ready",
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response();
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("telemetry probe timed out after {READINESS_TIMEOUT:?}"),
    };

    warn!(error = %error, "Readiness probe failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "not ready",
            "error": error,
        })),
    )
        .into_response()
}

async fn metrics_exposition(State(state): State<OperatorState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
