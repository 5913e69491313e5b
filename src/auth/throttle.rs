use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::metrics::prometheus;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-client budget of login attempts.
///
/// Every attempt consumes one cell, whatever its outcome; the budget refills
/// continuously at `limit` cells per minute (GCRA).
pub struct LoginThrottle {
    limiter: Option<KeyedLimiter>,
    limit: u32,
}

impl LoginThrottle {
    /// `attempts_per_minute == 0` disables the throttle.
    pub fn new(attempts_per_minute: u32) -> Self {
        let limiter = NonZeroU32::new(attempts_per_minute)
            .map(|n| RateLimiter::keyed(Quota::per_minute(n)));

        Self {
            limiter,
            limit: attempts_per_minute,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Consume one attempt for `identity`.
    ///
    /// # Errors
    ///
    /// [`AppError::RateLimited`] once the budget is exhausted.
    pub fn check(&self, identity: &str) -> AppResult<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        limiter.check_key(&identity.to_string()).map_err(|not_until| {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);

            warn!(
                client_ip = %identity,
                retry_after_secs = retry_after,
                "Login blocked after too many attempts"
            );
            prometheus::record_rate_limited();

            AppError::RateLimited {
                retry_after_secs: retry_after,
                limit: Some(self.limit),
            }
        })
    }

    /// Drop state for clients whose budget has fully refilled.
    pub fn compact(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }
}
