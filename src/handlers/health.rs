//! Health and metrics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness with version and uptime; `?metrics=true`
//!   embeds the metrics snapshot
//! - `GET /metrics` - JSON snapshot of the request metrics
//!
//! Prometheus scrapes a separate listener (`METRICS_PORT`), not these routes.

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use tracing::instrument;

use crate::metrics::MetricsSnapshot;
use crate::models::{HealthQuery, HealthResponse};
use crate::state::AppState;

/// Health check endpoint. Always 200 while the process is serving.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        metrics: query.metrics.then(|| state.metrics.snapshot()),
    })
}

/// Metrics snapshot endpoint.
#[instrument(skip(state))]
pub async fn metrics_snapshot(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
