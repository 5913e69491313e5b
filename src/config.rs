//! Application configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET_KEY`: HMAC signing secret (at least 32 bytes). When unset a
//!   random key is generated per process and tokens do not survive restarts.
//! - `TRUSTED_ORIGINS`: Comma-separated CORS allow-list (`*` allows any origin)
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarding headers are honoured
//!
//! # Limits
//!
//! - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW`: sliding-window quota per client
//! - `MAX_REQUEST_BODY_SIZE`: request body cap in bytes (default: 1 MiB)
//! - `REQUEST_TIMEOUT_SECS`: per-request deadline (default: 30)
//! - `LOGIN_ATTEMPT_LIMIT`: login attempts per client per minute (0 = unlimited)

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::MIN_SECRET_LEN;
use crate::error::{AppError, AppResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    // =========================================================================
    // Persistence
    // =========================================================================
    /// Postgres connection URL. Unset selects the in-memory store.
    pub database_url: Option<String>,

    /// Pool size for the Postgres store (default: 25)
    pub db_max_connections: u32,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Token signing secret. `None` generates a random per-process key.
    pub jwt_secret: Option<String>,

    /// Token lifetime (default: 24h)
    pub jwt_expiration: Duration,

    /// Value of the `iss` claim, checked on validation
    pub jwt_issuer: String,

    /// Login attempts allowed per client per minute (default: 10, 0 = unlimited)
    pub login_attempt_limit: u32,

    // =========================================================================
    // Rate Limiting
    // =========================================================================
    pub rate_limit_enabled: bool,

    /// Requests allowed per client within one window (default: 100)
    pub rate_limit_requests: u32,

    /// Sliding window length (default: 60s)
    pub rate_limit_window: Duration,

    // =========================================================================
    // Request Limits
    // =========================================================================
    /// Maximum request body size in bytes (default: 1 MiB)
    pub max_request_body_size: usize,

    /// Deadline for one request (default: 30s)
    pub request_timeout: Duration,

    // =========================================================================
    // CORS / Proxies
    // =========================================================================
    pub cors_enabled: bool,

    /// Allowed CORS origins. `*` allows any origin without credentials.
    pub trusted_origins: Vec<String>,

    /// Trusted proxy CIDR ranges for IP spoofing mitigation.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (forwarding headers are trusted from any peer)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter directive (e.g., "info", "account_service=debug")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Interval of the periodic metrics summary (default: 5 min, 0 = disabled)
    pub metrics_log_interval: Duration,

    /// Port for the Prometheus exporter (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let development = env::var("APP_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("development"));
        let default_format = if development {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        };

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,

            database_url: Self::optional_env("DATABASE_URL"),
            db_max_connections: Self::parse_env("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,

            jwt_secret: Self::optional_env("JWT_SECRET_KEY"),
            jwt_expiration: Duration::from_secs(Self::parse_env("JWT_EXPIRATION", 86_400)?),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            login_attempt_limit: Self::parse_env(
                "LOGIN_ATTEMPT_LIMIT",
                defaults.login_attempt_limit,
            )?,

            rate_limit_enabled: Self::parse_env("ENABLE_RATE_LIMIT", defaults.rate_limit_enabled)?,
            rate_limit_requests: Self::parse_env(
                "RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            rate_limit_window: Duration::from_secs(Self::parse_env("RATE_LIMIT_WINDOW", 60)?),

            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,
            request_timeout: Duration::from_secs(Self::parse_env("REQUEST_TIMEOUT_SECS", 30)?),

            cors_enabled: Self::parse_env("ENABLE_CORS", defaults.cors_enabled)?,
            trusted_origins: Self::parse_list("TRUSTED_ORIGINS")
                .unwrap_or(defaults.trusted_origins),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES").unwrap_or_default(),

            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: Self::parse_env("LOG_FORMAT", default_format)?,
            metrics_log_interval: Duration::from_secs(Self::parse_env(
                "METRICS_LOG_INTERVAL_SECS",
                300,
            )?),
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.rate_limit_enabled {
            if self.rate_limit_requests == 0 {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_REQUESTS must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
            if self.rate_limit_window.is_zero() {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_WINDOW must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.jwt_expiration.is_zero() {
            return Err(AppError::ConfigError(
                "JWT_EXPIRATION must be greater than 0".to_string(),
            ));
        }

        if let Some(secret) = &self.jwt_secret
            && secret.len() < MIN_SECRET_LEN
        {
            return Err(AppError::ConfigError(format!(
                "JWT_SECRET_KEY must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Whether CORS allows any origin.
    pub fn cors_allows_any_origin(&self) -> bool {
        self.trusted_origins.iter().any(|o| o == "*")
    }

    /// Get the Prometheus exporter address, `None` when disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        (self.metrics_port > 0).then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    fn optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Parse a comma-separated list. `None` when the variable is unset or empty.
    fn parse_list(name: &str) -> Option<Vec<String>> {
        Self::optional_env(name).map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            db_max_connections: 25,
            jwt_secret: None,
            jwt_expiration: Duration::from_secs(86_400),
            jwt_issuer: "account_service".to_string(),
            login_attempt_limit: 10,
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            max_request_body_size: 1024 * 1024, // 1 MiB
            request_timeout: Duration::from_secs(30),
            cors_enabled: true,
            trusted_origins: vec!["http://localhost:3000".to_string()],
            trusted_proxies: vec![],
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_log_interval: Duration::from_secs(300),
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.max_request_body_size, 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.jwt_expiration, Duration::from_secs(86_400));
        assert!(config.jwt_secret.is_none());
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_window() {
        let config = Config {
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_WINDOW"));
    }

    #[test]
    fn test_zero_window_allowed_when_rate_limit_disabled() {
        let config = Config {
            rate_limit_enabled: false,
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_body_size_zero() {
        let config = Config {
            max_request_body_size: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("MAX_REQUEST_BODY_SIZE")
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            request_timeout: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_short_secret() {
        let config = Config {
            jwt_secret: Some("too-short".to_string()),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("JWT_SECRET_KEY"));
    }

    #[test]
    fn test_cors_any_origin() {
        let config = Config {
            trusted_origins: vec!["*".to_string()],
            ..Config::default()
        };
        assert!(config.cors_allows_any_origin());
        assert!(!Config::default().cors_allows_any_origin());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_metrics_addr() {
        let config = Config {
            metrics_port: 9090,
            ..Config::default()
        };
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }
}
