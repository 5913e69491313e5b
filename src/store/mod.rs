//! User persistence.
//!
//! Handlers only see the [`UserStore`] trait, held as `Arc<dyn UserStore>` in
//! the application state. Two implementations ship with the crate:
//!
//! - [`InMemoryUserStore`] - default when no `DATABASE_URL` is set, and the
//!   store used by the test suite
//! - [`PgUserStore`] - PostgreSQL via `sqlx`

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{NewUser, User};

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

/// Failures surfaced by a [`UserStore`].
///
/// Converted into `AppError` at the handler boundary; backend detail is
/// logged there and never sent to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("email already registered")]
    Conflict,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Storage interface for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user and return it with its assigned id and timestamps.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the email is already registered.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Persist every mutable field of `user` (matched by id).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the id does not exist,
    /// [`StoreError::Conflict`] if the new email belongs to another account.
    async fn update(&self, user: User) -> Result<User, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}
