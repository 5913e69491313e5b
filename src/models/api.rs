use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;
use crate::metrics::MetricsSnapshot;

/// Request to register a new user.
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Partial update of a user. Absent or empty fields are left unchanged.
#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Login credentials.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Issued token plus the identity it was issued for.
///
/// Returned by both login and refresh.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

/// Minimal identity view embedded in token responses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Public representation of a user account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Metrics snapshot, only when requested with `?metrics=true`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

/// Query parameters accepted by the health endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct HealthQuery {
    #[serde(default)]
    pub metrics: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_update_request_all_fields_optional() {
        let request: UpdateUserRequest =
            serde_json::from_str("{}").expect("Deserialization should succeed");

        assert!(request.username.is_none());
        assert!(request.email.is_none());
        assert!(request.password.is_none());
    }

    #[test]
    fn test_user_response_hides_password() {
        let json = serde_json::to_string(&UserResponse::from(sample_user()))
            .expect("Serialization should succeed");

        assert!(json.contains("\"id\":7"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_user_serialization_skips_hash() {
        let json = serde_json::to_string(&sample_user()).expect("Serialization should succeed");
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_health_response_omits_metrics_by_default() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
            uptime_seconds: 3,
            metrics: None,
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(!json.contains("metrics"));
    }
}
