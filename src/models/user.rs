use chrono::{DateTime, Utc};
use serde::Serialize;

/// A persisted user account.
///
/// `password_hash` is never serialized; API responses go through
/// [`UserResponse`](super::UserResponse) or [`UserSummary`](super::UserSummary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to insert a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
