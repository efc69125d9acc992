//! Key Repository Implementation
//!
//! PostgreSQL implementation of the KeyRepository trait over the
//! `encryption_keys` and `wrapped_secrets` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{EncryptionKey, KeyRepository, WrappedEntry, WrappedSecret};
use crate::shared::crypto::SecretKey;
use crate::shared::error::AppError;

/// The single row id of `wrapped_secrets`.
const SECRET_ROW: i16 = 1;

#[derive(Debug, sqlx::FromRow)]
struct KeyRow {
    key_id: Uuid,
    key_material: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl KeyRow {
    fn into_key(mut self) -> Result<EncryptionKey, AppError> {
        let key_material = SecretKey::from_slice(&self.key_material);
        zeroize::Zeroize::zeroize(&mut self.key_material);

        Ok(EncryptionKey {
            key_id: self.key_id,
            key_material: key_material.map_err(|e| {
                AppError::Internal(format!("Stored key {} is unusable: {}", self.key_id, e))
            })?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WrappedSecretRow {
    version: i64,
    entries: Json<Vec<WrappedEntry>>,
    updated_at: DateTime<Utc>,
}

impl WrappedSecretRow {
    fn into_secret(self) -> WrappedSecret {
        WrappedSecret {
            version: self.version,
            entries: self.entries.0,
            updated_at: self.updated_at,
        }
    }
}

/// PostgreSQL key store.
#[derive(Clone)]
pub struct PgKeyRepository {
    pool: PgPool,
}

impl PgKeyRepository {
    /// Create a new PgKeyRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRepository for PgKeyRepository {
    async fn load_keys(&self) -> Result<Vec<EncryptionKey>, AppError> {
        let rows = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT key_id, key_material, created_at
            FROM encryption_keys
            ORDER BY created_at ASC, key_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(KeyRow::into_key).collect()
    }

    async fn save_key(&self, key: &EncryptionKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO encryption_keys (key_id, key_material, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(key.key_id)
        .bind(key.key_material.as_bytes())
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Key {} already exists", key.key_id))
            }
            _ => AppError::Database(e),
        })?;

        Ok(())
    }

    async fn delete_key(&self, key_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM encryption_keys WHERE key_id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_wrapped_secret(&self) -> Result<Option<WrappedSecret>, AppError> {
        let row = sqlx::query_as::<_, WrappedSecretRow>(
            r#"
            SELECT version, entries, updated_at
            FROM wrapped_secrets
            WHERE id = $1
            "#,
        )
        .bind(SECRET_ROW)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WrappedSecretRow::into_secret))
    }

    async fn save_wrapped_secret(&self, secret: &WrappedSecret) -> Result<bool, AppError> {
        let entries = Json(&secret.entries);

        let result = if secret.version == 1 {
            sqlx::query(
                r#"
                INSERT INTO wrapped_secrets (id, version, entries, updated_at)
                VALUES ($1, 1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(SECRET_ROW)
            .bind(entries)
            .bind(secret.updated_at)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE wrapped_secrets
                SET version = $2, entries = $3, updated_at = $4
                WHERE id = $1 AND version = $2 - 1
                "#,
            )
            .bind(SECRET_ROW)
            .bind(secret.version)
            .bind(entries)
            .bind(secret.updated_at)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }
}
