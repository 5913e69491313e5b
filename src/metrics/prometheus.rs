//! Prometheus export through the `metrics` facade.
//!
//! Recording functions are always safe to call; without an installed
//! recorder they are no-ops.
//!
//! # Metrics
//!
//! - `http_requests_total` counter (labels: method, path, status)
//! - `http_request_duration_seconds` histogram (labels: method, path)
//! - `http_active_connections` gauge
//! - `http_rate_limited_total` counter
//! - `auth_login_failures_total` counter

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_ACTIVE_CONNECTIONS: &str = "http_active_connections";
    pub const HTTP_RATE_LIMITED_TOTAL: &str = "http_rate_limited_total";
    pub const AUTH_LOGIN_FAILURES_TOTAL: &str = "auth_login_failures_total";
}

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total HTTP requests handled");
    describe_histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::HTTP_ACTIVE_CONNECTIONS,
        "Requests currently inside the pipeline"
    );
    describe_counter!(
        names::HTTP_RATE_LIMITED_TOTAL,
        "Requests rejected by the per-client rate limiter"
    );
    describe_counter!(
        names::AUTH_LOGIN_FAILURES_TOTAL,
        "Failed login attempts"
    );

    info!(addr = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Like [`init_metrics`] but logs failures instead of returning them.
pub fn try_init_metrics(addr: SocketAddr) {
    if let Err(e) = init_metrics(addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without Prometheus export");
    }
}

pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(names::HTTP_REQUESTS_TOTAL, "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, "method" => method.to_string(), "path" => path.to_string())
        .record(duration.as_secs_f64());
}

pub fn set_active_connections(active: u64) {
    gauge!(names::HTTP_ACTIVE_CONNECTIONS).set(active as f64);
}

pub fn record_rate_limited() {
    counter!(names::HTTP_RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_login_failure() {
    counter!(names::AUTH_LOGIN_FAILURES_TOTAL).increment(1);
}
