use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StoreError, UserStore};
use crate::models::{NewUser, User};

/// Process-local [`UserStore`] backed by a hash map.
///
/// Ids start at 1 and are never reused. Email uniqueness is checked
/// case-sensitively, matching the Postgres unique constraint.
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<i64, User>>,
    next_id: AtomicI64,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(id, created.clone());

        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Conflict);
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryUserStore::new();
        let a = store.create(new_user("a@example.com")).await.unwrap();
        let b = store.create(new_user("b@example.com")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_create_duplicate_email_conflicts() {
        let store = InMemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();

        let result = store.create(new_user("a@example.com")).await;
        assert_eq!(result.unwrap_err(), StoreError::Conflict);
    }

    #[tokio::test]
    async fn test_get_by_email() {
        let store = InMemoryUserStore::new();
        let created = store.create(new_user("a@example.com")).await.unwrap();

        let found = store.get_by_email("a@example.com").await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(
            store.get_by_email("missing@example.com").await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_update_to_taken_email_conflicts() {
        let store = InMemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();
        let mut b = store.create(new_user("b@example.com")).await.unwrap();

        b.email = "a@example.com".to_string();
        assert_eq!(store.update(b).await.unwrap_err(), StoreError::Conflict);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = InMemoryUserStore::new();
        let mut user = store.create(new_user("a@example.com")).await.unwrap();
        user.id = 99;

        assert_eq!(store.update(user).await.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();

        store.delete(user.id).await.unwrap();
        assert_eq!(
            store.get_by_id(user.id).await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            store.delete(user.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }
}
