//! User Repository Implementation
//!
//! PostgreSQL implementation of the UserRepository trait.
//! Maps between the database schema and domain User entity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{User, UserRepository};
use crate::shared::error::AppError;

/// Database row representation matching the users table schema.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    handle: String,
    password_hash: String,
    token: Option<String>,
    disabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Convert database row to domain User entity.
    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            handle: self.handle,
            password_hash: self.password_hash,
            token: self.token,
            disabled: self.disabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, handle, password_hash, token, disabled, created_at, updated_at";

/// PostgreSQL user repository implementation.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(UserRow::into_user))
    }

    async fn update_column(&self, id: &str, column: &str, value: &str) -> Result<(), AppError> {
        let query = format!(
            "UPDATE users SET {} = $2, updated_at = NOW() WHERE id = $1",
            column
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.find_one("id", id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_one("username", username).await
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>, AppError> {
        self.find_one("handle", handle).await
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let query = format!(
            r#"
            INSERT INTO users (id, username, handle, password_hash, token, disabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.handle)
            .bind(&user.password_hash)
            .bind(&user.token)
            .bind(user.disabled)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict("User with this username or handle already exists".to_string())
                }
                _ => AppError::Database(e),
            })?;

        Ok(row.into_user())
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        self.update_column(id, "password_hash", password_hash).await
    }

    async fn update_token(&self, id: &str, token: &str) -> Result<(), AppError> {
        self.update_column(id, "token", token).await
    }
}
