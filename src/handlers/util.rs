//! Shared utilities for handlers.

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::rejection::PathRejection;
use tracing::debug;

use crate::auth::TokenService;
use crate::error::{AppError, AppResult};

/// Unwrap a `{id}` path segment, mapping a non-numeric id to a JSON 400.
pub fn user_id(path: Result<Path<i64>, PathRejection>) -> AppResult<i64> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            debug!(error = %rejection, "Rejected user id path segment");
            Err(AppError::Validation("Invalid user ID".to_string()))
        }
    }
}

/// Hash a password on the blocking pool.
///
/// Argon2 takes tens of milliseconds of CPU; running it inline would stall
/// the async worker for every other request scheduled on it.
pub async fn hash_password(tokens: Arc<TokenService>, password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || tokens.hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
}

/// Check a login attempt on the blocking pool. See
/// [`TokenService::verify_credentials`].
pub async fn verify_credentials(
    tokens: Arc<TokenService>,
    stored_hash: Option<String>,
    password: String,
) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || tokens.verify_credentials(stored_hash.as_deref(), &password))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tokens() -> Arc<TokenService> {
        Arc::new(
            TokenService::new(
                b"0123456789abcdef0123456789abcdef",
                Duration::from_secs(60),
                "account_service",
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_hash_then_verify_on_blocking_pool() {
        let tokens = tokens();
        let hash = hash_password(tokens.clone(), "hunter2hunter2".to_string())
            .await
            .unwrap();

        assert!(
            verify_credentials(tokens.clone(), Some(hash.clone()), "hunter2hunter2".to_string())
                .await
                .unwrap()
        );
        assert!(
            !verify_credentials(tokens, Some(hash), "wrong-password".to_string())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_user_never_verifies() {
        assert!(
            !verify_credentials(tokens(), None, "anything-at-all".to_string())
                .await
                .unwrap()
        );
    }
}
