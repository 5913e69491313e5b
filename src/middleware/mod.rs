//! The request pipeline.
//!
//! Every request passes the same stages in a fixed order, outermost first:
//!
//! ```text
//! Request
//!   → Recovery          500 on panic, resolves ClientIdentity
//!   → Security headers
//!   → CORS              preflight answered here
//!   → Logging           X-Request-Id, one completion event
//!   → Metrics           per-route counts and latency
//!   → Rate limit        429
//!   → Validation        413 / 415
//!   → Timeout           408
//!   → Auth (protected)  401
//!   → Handler
//! ```
//!
//! Any stage may answer on its own; the stages outside it still see that
//! response on the way back out. Assembly lives in [`crate::routes`].
//!
//! # Security Considerations
//!
//! - Client identity only trusts forwarding headers from configured proxies
//! - Token failures all produce the same 401 body
//! - Panic payloads are logged, never returned

pub mod auth;
pub mod cors;
pub mod ip;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod request_validation;
pub mod security_headers;
pub mod timeout;

pub use auth::{AuthenticatedUser, BearerAuth};
pub use cors::cors_layer;
pub use ip::{ClientIdentity, TrustedProxyConfig, UNKNOWN_IP, resolve_client_ip};
pub use logging::{LoggingLayer, REQUEST_ID_HEADER, RequestIdExt};
pub use metrics::track_metrics;
pub use rate_limit::{RateLimitLayer, RateLimiter};
pub use recovery::RecoveryLayer;
pub use request_validation::validate_request;
pub use security_headers::security_headers;
pub use timeout::{RequestDeadline, enforce_timeout};
