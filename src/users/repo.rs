use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::users::model::{NewUserRecord, User, UserChanges};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    /// A unique constraint was violated; carries the offending field.
    #[error("conflict on {0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn find(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>>;
    async fn create(&self, record: NewUserRecord) -> StoreResult<User>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User>;
    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<User>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, phone_number, api_key, role, \
                            external_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

/// Column guarded by a unique constraint of the `users` table.
fn conflicting_column(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_api_key_key") => "api_key",
        _ => "email",
    }
}

/// Maps unique violations onto the column they guard.
fn map_write_error(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(conflicting_column(db_err.constraint()));
        }
    }
    StoreError::Unexpected(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE api_key = $1"
        ))
        .bind(api_key)
        .fetch_optional(&self.db)
        .await
        .context("find user by api key")?;
        Ok(user)
    }

    async fn create(&self, record: NewUserRecord) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, phone_number, api_key, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(record.name)
        .bind(record.email)
        .bind(record.password_hash)
        .bind(record.phone_number)
        .bind(record.api_key)
        .bind(record.role)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   phone_number = COALESCE($4, phone_number),
                   role = COALESCE($5, role),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.phone_number)
        .bind(changes.role)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?
        .ok_or(StoreError::NotFound)
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET external_id = $2, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(external_id)
        .fetch_optional(&self.db)
        .await
        .context("set external id")?
        .ok_or(StoreError::NotFound)
    }
}
