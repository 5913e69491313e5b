//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Recovery     │ ← 500 on panic, resolves client identity
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← nosniff, DENY, HSTS, CSP, ...
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │       CORS       │ ← answers preflight (if ENABLE_CORS)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Logging      │ ← X-Request-Id, completion event
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Metrics      │ ← per-route counts and latency
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if exceeded (if ENABLE_RATE_LIMIT)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Validation    │ ← 413 / 415
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Timeout      │ ← 408 after REQUEST_TIMEOUT_SECS
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Bearer Auth    │ ← 401, protected routes only
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/metrics` - Monitoring
//! - `/auth/login`, `POST /users` - Public
//! - `/auth/refresh`, `/auth/profile`, `/users/{id}` - Bearer token required

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tracing::info;

use crate::handlers;
use crate::middleware::{
    BearerAuth, LoggingLayer, RateLimitLayer, RecoveryLayer, cors_layer, enforce_timeout,
    security_headers, track_metrics, validate_request,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    apply_middleware(routes(&state), &state).with_state(state)
}

/// All routes, with bearer authentication on the protected group and no
/// other middleware.
pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/profile", get(handlers::profile))
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(BearerAuth::new(state.tokens.clone()));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_snapshot))
        .route("/auth/login", post(handlers::login))
        .route("/users", post(handlers::create_user))
        .merge(protected)
}

/// Wrap `router` in the request pipeline.
///
/// Layers are added innermost first. Public so extra routes (tests, admin
/// endpoints) get the same pipeline as the built-in ones.
pub fn apply_middleware(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let config = &state.config;

    info!(
        max_body_bytes = config.max_request_body_size,
        timeout_secs = config.request_timeout.as_secs(),
        "Request limits configured"
    );
    let mut router = router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(from_fn_with_state(config.request_timeout, enforce_timeout))
        .layer(from_fn_with_state(
            config.max_request_body_size,
            validate_request,
        ));

    if config.rate_limit_enabled {
        info!(
            requests = config.rate_limit_requests,
            window_secs = config.rate_limit_window.as_secs(),
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(
            state.rate_limiter.clone(),
            state.trusted_proxies.clone(),
        ));
    } else {
        info!("Rate limiting disabled (ENABLE_RATE_LIMIT=false)");
    }

    router = router
        .layer(from_fn_with_state(state.metrics.clone(), track_metrics))
        .layer(LoggingLayer::new(state.trusted_proxies.clone()));

    if config.cors_enabled {
        info!(origins = ?config.trusted_origins, "CORS enabled");
        router = router.layer(cors_layer(&config.trusted_origins));
    }

    router
        .layer(from_fn(security_headers))
        .layer(RecoveryLayer::new(state.trusted_proxies.clone()))
}
