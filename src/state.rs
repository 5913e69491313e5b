//! Shared application state for Axum handlers.
//!
//! Every component the pipeline and handlers share is created here and held
//! behind an `Arc`, so each test can build a fresh, isolated instance:
//!
//! - **Store**: the [`UserStore`] implementation
//! - **Tokens**: signing, validation and password hashing
//! - **Metrics / rate limiting**: the aggregator, sliding-window limiter and
//!   login throttle
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::auth::{LoginThrottle, TokenService};
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics::MetricsAggregator;
use crate::middleware::{RateLimiter, TrustedProxyConfig};
use crate::store::UserStore;

/// Shared application state for Axum handlers.
///
/// Cloned per request; all fields are cheap handles.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, Arc::new(InMemoryUserStore::new()))?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn UserStore>,
    pub tokens: Arc<TokenService>,
    pub metrics: Arc<MetricsAggregator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub login_throttle: Arc<LoginThrottle>,
    pub trusted_proxies: Arc<TrustedProxyConfig>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state and start its background tasks.
    ///
    /// # Background Tasks
    ///
    /// - Rate limit compaction, once per window, while rate limiting is on
    /// - Login throttle compaction, once a minute, while the throttle is on
    /// - Metrics summary log, every `metrics_log_interval` unless zero
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `AppError::ConfigError` if the token settings are unusable.
    pub fn new(config: Config, store: Arc<dyn UserStore>) -> AppResult<Self> {
        let tokens = match &config.jwt_secret {
            Some(secret) => {
                TokenService::new(secret.as_bytes(), config.jwt_expiration, &config.jwt_issuer)?
            }
            None => TokenService::with_random_secret(config.jwt_expiration, &config.jwt_issuer)?,
        };

        let state = Self {
            store,
            tokens: Arc::new(tokens),
            metrics: Arc::new(MetricsAggregator::new()),
            rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit_requests,
                config.rate_limit_window,
            )),
            login_throttle: Arc::new(LoginThrottle::new(config.login_attempt_limit)),
            trusted_proxies: Arc::new(TrustedProxyConfig::new(&config.trusted_proxies)),
            started_at: Instant::now(),
            config: Arc::new(config),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        if state.config.rate_limit_enabled {
            state.task_tracker.spawn(
                state
                    .rate_limiter
                    .clone()
                    .run_compaction(state.cancellation_token.clone()),
            );
        }
        if state.login_throttle.is_enabled() {
            state.spawn_throttle_compaction_task();
        }
        if !state.config.metrics_log_interval.is_zero() {
            state.spawn_metrics_log_task();
        }

        Ok(state)
    }

    /// Periodically forget clients whose login budget has refilled.
    fn spawn_throttle_compaction_task(&self) {
        let throttle = self.login_throttle.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(60));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Login throttle compaction task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => throttle.compact(),
                }
            }
        });
    }

    /// Log a metrics summary every `metrics_log_interval`.
    fn spawn_metrics_log_task(&self) {
        let metrics = self.metrics.clone();
        let period = self.config.metrics_log_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Metrics log task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => metrics.log_summary(),
                }
            }
        });
    }

    /// Stop all background tasks, wait for them, and log final metrics.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
        self.metrics.log_summary();
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
