//! In-memory user store.
//!
//! Backs the HTTP tests and local runs without Postgres. Enforces the same
//! uniqueness rules as the `users` table (`email`, `api_key`). State is lost
//! on restart.
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::model::{NewUserRecord, User, UserChanges};
use crate::users::repo::{StoreError, StoreResult, UserStore};

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, bypassing id/timestamp assignment.
    pub async fn insert(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(field) = conflicting_field(&users, None, &user.email, Some(&user.api_key)) {
            return Err(StoreError::Conflict(field));
        }
        users.push(user.clone());
        Ok(user)
    }
}

fn conflicting_field(
    users: &[User],
    skip: Option<Uuid>,
    email: &str,
    api_key: Option<&str>,
) -> Option<&'static str> {
    let others = users.iter().filter(|u| Some(u.id) != skip);
    for u in others {
        if u.email == email {
            return Some("email");
        }
        if api_key.is_some_and(|k| k == u.api_key) {
            return Some("api_key");
        }
    }
    None
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn list(&self) -> StoreResult<Vec<User>> {
        Ok(self.users.read().await.clone())
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.api_key == api_key)
            .cloned())
    }

    async fn create(&self, record: NewUserRecord) -> StoreResult<User> {
        let now = OffsetDateTime::now_utc();
        self.insert(User {
            id: Uuid::new_v4(),
            name: record.name,
            email: record.email,
            password_hash: record.password_hash,
            phone_number: record.phone_number,
            api_key: record.api_key,
            role: record.role,
            external_id: None,
            created_at: now,
            updated_at: now,
        })
        .await
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(email) = changes.email.as_deref() {
            if let Some(field) = conflicting_field(&users, Some(id), email, None) {
                return Err(StoreError::Conflict(field));
            }
        }
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(phone_number) = changes.phone_number {
            user.phone_number = phone_number;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.external_id = Some(external_id.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}
