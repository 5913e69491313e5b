//! Per-client rate limiting over a sliding window.
//!
//! # Algorithm
//!
//! Each client identity owns an ordered log of request timestamps. A request
//! is admitted when fewer than `max_requests` timestamps fall inside the
//! trailing `window`. Pruning, the count check and the append happen under
//! one lock acquisition, so two concurrent requests can never both observe
//! "under limit" for the last free slot.
//!
//! A background sweep ([`RateLimiter::run_compaction`]) runs once per window
//! and evicts identities whose log has emptied, bounding memory to clients
//! active in the last window. Between sweeps the map can grow with the
//! number of distinct identities seen.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the oldest logged request leaves the window
//! - `X-RateLimit-Limit`: Configured requests per window
//! - `X-RateLimit-Remaining`: `0`

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::{ClientIdentity, TrustedProxyConfig};
use crate::error::AppError;
use crate::metrics::prometheus;

/// Sliding-window request limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        u32::try_from(self.max_requests).unwrap_or(u32::MAX)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject one request for `identity`.
    pub fn allow(&self, identity: &str) -> bool {
        self.check(identity).is_ok()
    }

    /// Like [`allow`](Self::allow), returning how long until a slot frees up
    /// on rejection.
    pub fn check(&self, identity: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let log = windows.entry(identity.to_string()).or_default();
        prune(log, now, self.window);

        if log.len() >= self.max_requests {
            let retry_after = log
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        log.push_back(now);
        Ok(())
    }

    /// Prune every log and drop identities with nothing left in the window.
    ///
    /// Returns the number of identities evicted.
    pub fn compact(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();

        windows.retain(|_, log| {
            prune(log, now, self.window);
            !log.is_empty()
        });

        before - windows.len()
    }

    /// Number of identities currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }

    /// Run [`compact`](Self::compact) once per window until `cancel` fires.
    pub async fn run_compaction(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Rate limit compaction task received cancellation signal");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = self.compact();
                    if evicted > 0 {
                        debug!(evicted, remaining = self.tracked_clients(), "Compacted rate limit windows");
                    }
                }
            }
        }
    }
}

/// Drop timestamps that are at least `window` old.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(60)));
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(RateLimitLayer::new(limiter, Arc::new(TrustedProxyConfig::default())));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self {
            limiter,
            trusted_proxies,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let identity = ClientIdentity::of(&req, &self.trusted_proxies);
        let decision = self.limiter.check(identity.as_str());
        let limit = self.limiter.max_requests();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match decision {
                Ok(()) => inner.call(req).await,
                Err(wait) => {
                    let retry_after = wait.as_secs().max(1);

                    warn!(
                        client_ip = %identity,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    prometheus::record_rate_limited();

                    Ok(AppError::RateLimited {
                        retry_after_secs: retry_after,
                        limit: Some(limit),
                    }
                    .into_response())
                }
            }
        })
    }
}
