use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Everything below the handler boundary (store, token, hashing failures) is
/// translated into one of these variants before it reaches the client.
/// Internal detail is logged server-side and never copied into a 401 or 5xx
/// response body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        limit: Option<u32>,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
///
/// `error` is always the canonical reason phrase of the status code, so
/// clients can rely on it as a stable discriminator.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: Some(message.into()),
        }
    }
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Fixed strings for 401 and 5xx.
    fn client_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Unauthorized(e) => e.client_message().to_string(),
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::PayloadTooLarge { .. } => "Request body exceeds maximum size".to_string(),
            AppError::UnsupportedMediaType(_) => {
                "Content-Type must be application/json".to_string()
            }
            AppError::RateLimited { .. } => "Too many requests".to_string(),
            AppError::Timeout => "Request took too long to process".to_string(),
            AppError::Internal(_) | AppError::ConfigError(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Full detail stays in the server log; the body only carries the
        // sanitised message.
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = axum::Json(ErrorResponse::new(status, self.client_message()));
        let mut response = (status, body).into_response();

        if matches!(self, AppError::Unauthorized(_) | AppError::InvalidCredentials) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        if let AppError::RateLimited {
            retry_after_secs,
            limit,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            if let Some(limit) = limit {
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            }
        }

        response
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("User not found".to_string()),
            StoreError::Conflict => {
                AppError::Conflict("User with this email already exists".to_string())
            }
            StoreError::Backend(detail) => AppError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                AppError::UnsupportedMediaType(rejection.body_text())
            }
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge { limit: 0 },
            _ => AppError::Validation(sanitize_json_error(&rejection.body_text())),
        }
    }
}

/// Sanitize JSON decoding errors to avoid leaking internal type information.
///
/// Serde messages can contain internal struct names which shouldn't be
/// exposed to external clients. This keeps only the useful parts.
fn sanitize_json_error(msg: &str) -> String {
    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Missing required field: {field}");
    }

    if msg.contains("unknown field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    "Invalid request body".to_string()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_credentials_body() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_internal_error_does_not_leak_detail() {
        let response =
            AppError::Internal("connection refused at 10.0.0.5:5432".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_rate_limited_sets_headers() {
        let response = AppError::RateLimited {
            retry_after_secs: 12,
            limit: Some(100),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "12");
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            AppError::from(StoreError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(StoreError::Conflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(StoreError::Backend("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_sanitize_missing_field() {
        let msg = "Failed to deserialize the JSON body into the target type: missing field `email` at line 1 column 2";
        assert_eq!(sanitize_json_error(msg), "Missing required field: email");
    }

    #[test]
    fn test_sanitize_syntax_error_is_generic() {
        let msg = "Failed to parse the request body as JSON: expected value at line 1 column 1";
        assert_eq!(sanitize_json_error(msg), "Invalid request body");
    }
}
