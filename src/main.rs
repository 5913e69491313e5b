use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use account_service::config::LogFormat;
use account_service::metrics::prometheus;
use account_service::store::{InMemoryUserStore, PgUserStore, UserStore};
use account_service::{AppState, Config, build_router, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info", LogFormat::Json);
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    init_tracing(&config.log_level, config.log_format);

    info!(
        "Starting Account Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Json => builder.json().with_current_span(true).init(),
        LogFormat::Pretty => builder.with_thread_ids(true).init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = config.port,
        rate_limit = config.rate_limit_enabled,
        cors = config.cors_enabled,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        prometheus::try_init_metrics(addr);
    }

    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let store = PgUserStore::connect(url, config.db_max_connections)
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {e}");
                    exitcode::UNAVAILABLE
                })?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory user store (data is lost on exit)");
            Arc::new(InMemoryUserStore::new())
        }
    };

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(config, store).map_err(|e| {
        error!("Failed to initialize application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET    /health        - Health check (?metrics=true)");
    info!("  GET    /metrics       - Metrics snapshot");
    info!("  POST   /auth/login    - Login");
    info!("  POST   /auth/refresh  - Refresh token (bearer)");
    info!("  GET    /auth/profile  - Current user (bearer)");
    info!("  POST   /users         - Register");
    info!("  GET    /users/{{id}}    - Get user (bearer)");
    info!("  PUT    /users/{{id}}    - Update user (bearer)");
    info!("  DELETE /users/{{id}}    - Delete user (bearer)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
