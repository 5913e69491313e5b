//! # Account Service
//!
//! User-account CRUD and bearer-token login over HTTP, built on Axum:
//!
//! - **Accounts**: registration, lookup, partial update, deletion
//! - **Authentication**: HMAC-signed JWTs, Argon2 password hashes, login
//!   throttling
//! - **Pipeline**: panic recovery, security headers, CORS, request logging,
//!   metrics, rate limiting, request validation, timeouts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Recovery → Headers → CORS → Log → Metrics →      │
//! │            Rate Limit → Validation → Timeout → [Auth])      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, auth, users)                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TokenService · MetricsAggregator · RateLimiter             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UserStore (in-memory or PostgreSQL)                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use account_service::store::InMemoryUserStore;
//! use account_service::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(InMemoryUserStore::new()))?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! ```bash
//! JWT_SECRET_KEY=$(openssl rand -hex 32) \
//! TRUSTED_PROXIES=10.0.0.0/8 \
//! TRUSTED_ORIGINS=https://app.example.com \
//! cargo run
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use auth::TokenService;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use metrics::MetricsAggregator;
pub use middleware::RateLimiter;
pub use routes::{apply_middleware, build_router, routes};
pub use state::AppState;
