use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use super::prometheus;

/// Duration samples retained per route; the oldest is evicted first.
pub const MAX_DURATION_SAMPLES: usize = 100;

#[derive(Debug, Default)]
struct RouteStats {
    count: u64,
    samples: VecDeque<Duration>,
    sample_sum: Duration,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: u64,
    error_count: u64,
    status_codes: BTreeMap<u16, u64>,
    routes: HashMap<String, RouteStats>,
    /// Sum and count over every retained sample of every route.
    retained_sum: Duration,
    retained_count: u64,
}

/// Per-route view in a [`MetricsSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub count: u64,
    pub samples: usize,
    pub average_duration_ms: f64,
    pub last_duration_ms: f64,
}

/// Point-in-time copy of the aggregated request metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub active_connections: u64,
    pub error_count: u64,
    pub average_response_time_ms: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub endpoints: BTreeMap<String, RouteSnapshot>,
    pub timestamp: i64,
}

/// Aggregates request outcomes per `(method, route)`.
///
/// Writers take the lock once per request. Averages are maintained from
/// running sums, so neither [`record`](Self::record) nor
/// [`snapshot`](Self::snapshot) rescans the sample buffers.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: RwLock<MetricsState>,
    active_connections: AtomicU64,
    started_at: Instant,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetricsState::default()),
            active_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one completed request.
    pub fn record(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let key = format!("{method} {path}");

        {
            let mut state = self.state.write();
            let state = &mut *state;

            state.total_requests += 1;
            *state.status_codes.entry(status).or_insert(0) += 1;
            if status >= 400 {
                state.error_count += 1;
            }

            let route = state.routes.entry(key).or_default();
            route.count += 1;
            if route.samples.len() >= MAX_DURATION_SAMPLES
                && let Some(evicted) = route.samples.pop_front()
            {
                route.sample_sum = route.sample_sum.saturating_sub(evicted);
                state.retained_sum = state.retained_sum.saturating_sub(evicted);
                state.retained_count -= 1;
            }
            route.samples.push_back(duration);
            route.sample_sum += duration;
            state.retained_sum += duration;
            state.retained_count += 1;
        }

        prometheus::record_request(method, path, status, duration);
    }

    /// Mark a request as entering the pipeline.
    ///
    /// The returned guard decrements the active-connection gauge when it is
    /// dropped, on every exit path. A guard dropped without
    /// [`InFlight::finish`] (the request future was dropped or unwound)
    /// is recorded as a 500.
    pub fn start_request(
        self: &Arc<Self>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> InFlight {
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prometheus::set_active_connections(active);

        InFlight {
            metrics: Arc::clone(self),
            method: method.into(),
            path: path.into(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Copy the current state out under the read lock.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();

        let endpoints = state
            .routes
            .iter()
            .map(|(key, route)| {
                let route_snapshot = RouteSnapshot {
                    count: route.count,
                    samples: route.samples.len(),
                    average_duration_ms: average_ms(route.sample_sum, route.samples.len() as u64),
                    last_duration_ms: route.samples.back().map_or(0.0, |d| as_ms(*d)),
                };
                (key.clone(), route_snapshot)
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.uptime().as_secs(),
            total_requests: state.total_requests,
            active_connections: self.active_connections(),
            error_count: state.error_count,
            average_response_time_ms: average_ms(state.retained_sum, state.retained_count),
            status_codes: state.status_codes.clone(),
            endpoints,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Emit a one-line summary at info level.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            total_requests = snapshot.total_requests,
            active_connections = snapshot.active_connections,
            error_count = snapshot.error_count,
            average_response_time_ms = snapshot.average_response_time_ms,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics"
        );
    }
}

/// Guard for one request in flight. See [`MetricsAggregator::start_request`].
#[must_use = "dropping the guard immediately ends the request"]
pub struct InFlight {
    metrics: Arc<MetricsAggregator>,
    method: String,
    path: String,
    started: Instant,
    finished: bool,
}

impl InFlight {
    /// Record the final status and elapsed time.
    pub fn finish(mut self, status: u16) {
        self.finished = true;
        self.metrics
            .record(&self.method, &self.path, status, self.started.elapsed());
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics
                .record(&self.method, &self.path, 500, self.started.elapsed());
        }
        let active = self.metrics.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
        prometheus::set_active_connections(active);
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn average_ms(sum: Duration, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        as_ms(sum) / count as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_route_count_and_sample_cap() {
        let metrics = MetricsAggregator::new();
        for _ in 0..150 {
            metrics.record("GET", "/users/{id}", 200, Duration::from_millis(2));
        }
        for _ in 0..7 {
            metrics.record("POST", "/users", 201, Duration::from_millis(4));
        }

        let snapshot = metrics.snapshot();
        let users = &snapshot.endpoints["GET /users/{id}"];
        assert_eq!(users.count, 150);
        assert_eq!(users.samples, MAX_DURATION_SAMPLES);

        let create = &snapshot.endpoints["POST /users"];
        assert_eq!(create.count, 7);
        assert_eq!(create.samples, 7);
        assert_eq!(snapshot.total_requests, 157);
    }

    #[test]
    fn test_eviction_updates_average() {
        let metrics = MetricsAggregator::new();
        for _ in 0..MAX_DURATION_SAMPLES {
            metrics.record("GET", "/health", 200, Duration::from_millis(10));
        }
        for _ in 0..MAX_DURATION_SAMPLES {
            metrics.record("GET", "/health", 200, Duration::from_millis(20));
        }

        let snapshot = metrics.snapshot();
        let health = &snapshot.endpoints["GET /health"];
        assert!((health.average_duration_ms - 20.0).abs() < 1e-6);
        assert!((health.last_duration_ms - 20.0).abs() < 1e-6);
        assert!((snapshot.average_response_time_ms - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_status_histogram_and_errors() {
        let metrics = MetricsAggregator::new();
        metrics.record("GET", "/a", 200, Duration::ZERO);
        metrics.record("GET", "/a", 404, Duration::ZERO);
        metrics.record("GET", "/a", 404, Duration::ZERO);
        metrics.record("GET", "/a", 500, Duration::ZERO);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.error_count, 3);
        assert_eq!(snapshot.status_codes[&200], 1);
        assert_eq!(snapshot.status_codes[&404], 2);
        assert_eq!(snapshot.status_codes[&500], 1);
    }

    #[test]
    fn test_in_flight_guard_tracks_active_connections() {
        let metrics = Arc::new(MetricsAggregator::new());

        let first = metrics.start_request("GET", "/a");
        let second = metrics.start_request("GET", "/b");
        assert_eq!(metrics.active_connections(), 2);

        first.finish(200);
        assert_eq!(metrics.active_connections(), 1);

        drop(second);
        assert_eq!(metrics.active_connections(), 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.status_codes[&200], 1);
        assert_eq!(snapshot.status_codes[&500], 1);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let metrics = Arc::new(MetricsAggregator::new());
        let cloned = Arc::clone(&metrics);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.start_request("GET", "/boom");
            panic!("handler failed");
        }));

        assert!(result.is_err());
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.snapshot().error_count, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(MetricsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record("GET", "/x", 200, Duration::from_micros(5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2000);
        assert_eq!(snapshot.endpoints["GET /x"].count, 2000);
        assert_eq!(snapshot.endpoints["GET /x"].samples, MAX_DURATION_SAMPLES);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsAggregator::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.average_response_time_ms, 0.0);
        assert!(snapshot.endpoints.is_empty());
    }
}
