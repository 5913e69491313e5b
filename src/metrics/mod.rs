//! Request metrics.
//!
//! [`MetricsAggregator`] keeps the in-process view served by `GET /metrics`
//! and `GET /health?metrics=true`. Every recorded request is also forwarded
//! to the `metrics` facade, which the optional Prometheus exporter in
//! [`prometheus`] scrapes.

mod aggregator;
pub mod prometheus;

pub use aggregator::{
    InFlight, MAX_DURATION_SAMPLES, MetricsAggregator, MetricsSnapshot, RouteSnapshot,
};
