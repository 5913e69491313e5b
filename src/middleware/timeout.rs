//! Request deadline enforcement.
//!
//! The inner stages run on their own task while the guard races that task's
//! completion against the configured deadline. Whichever finishes first
//! produces the response:
//!
//! - Inner task first: its response is returned unchanged.
//! - Deadline first: the guard answers `408 Request Timeout`, cancels the
//!   request's [`RequestDeadline`] token and detaches the task. The late
//!   response is dropped unread, so only one response is ever written.
//!
//! A detached handler is not aborted. Side effects it completes after the
//! deadline (a committed store write, say) stand even though the client saw
//! a 408, so clients must treat a timeout as "outcome unknown". Handlers that
//! can stop early should watch [`RequestDeadline::cancelled`].

use std::time::Duration;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, warn};

use crate::error::AppError;

/// Per-request deadline, inserted into request extensions by
/// [`enforce_timeout`].
#[derive(Debug, Clone)]
pub struct RequestDeadline {
    token: CancellationToken,
    timeout: Duration,
}

impl RequestDeadline {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves once the deadline has fired.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<S> FromRequestParts<S> for RequestDeadline
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestDeadline>()
            .cloned()
            .ok_or_else(|| AppError::Internal("timeout guard not installed".to_string()))
    }
}

/// Run the rest of the chain with a deadline of `timeout`.
///
/// Use with `axum::middleware::from_fn_with_state(timeout, enforce_timeout)`.
pub async fn enforce_timeout(
    State(timeout): State<Duration>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = CancellationToken::new();
    req.extensions_mut().insert(RequestDeadline {
        token: token.clone(),
        timeout,
    });

    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let mut handle = tokio::spawn(next.run(req).in_current_span());

    tokio::select! {
        biased;

        joined = &mut handle => match joined {
            Ok(response) => response,
            // Re-raise on this task so the recovery stage sees it
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(error = %e, "Request task was cancelled");
                AppError::Internal(e.to_string()).into_response()
            }
        },
        () = tokio::time::sleep(timeout) => {
            token.cancel();
            warn!(
                method = %method,
                path = %path,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Request timed out, handler detached"
            );
            AppError::Timeout.into_response()
        }
    }
}
