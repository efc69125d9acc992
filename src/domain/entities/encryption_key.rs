//! Envelope-encryption key store entities and repository traits.
//!
//! Maps to the `encryption_keys` and `wrapped_secrets` tables.
//!
//! The data key that seals session tokens is never stored in the clear. It
//! is stored as a [`WrappedSecret`]: one sealed copy per retained
//! [`EncryptionKey`], so any single retained key can recover it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::crypto::SecretKey;
use crate::shared::error::AppError;

/// A wrapping key.
///
/// Maps to the `encryption_keys` table:
/// - key_id: UUID PRIMARY KEY (v7, so ids sort by creation)
/// - key_material: BYTEA NOT NULL (32 bytes)
/// - created_at: TIMESTAMPTZ NOT NULL
#[derive(Debug, Clone)]
pub struct EncryptionKey {
    pub key_id: Uuid,
    pub key_material: SecretKey,
    pub created_at: DateTime<Utc>,
}

impl EncryptionKey {
    /// Create a key with fresh CSPRNG material.
    pub fn generate(created_at: DateTime<Utc>) -> Self {
        Self {
            key_id: Uuid::now_v7(),
            key_material: SecretKey::generate(),
            created_at,
        }
    }

    /// Age of this key relative to `now` (zero if `now` is earlier).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).max(Duration::zero())
    }

    /// Associated data binding a wrapped copy to this key.
    pub fn wrap_aad(&self) -> Vec<u8> {
        wrap_aad(self.key_id)
    }
}

/// Associated data for a data key sealed under `key_id`.
pub fn wrap_aad(key_id: Uuid) -> Vec<u8> {
    let mut aad = b"delta.wrap.v1:".to_vec();
    aad.extend_from_slice(key_id.as_bytes());
    aad
}

/// The data key sealed under one wrapping key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedEntry {
    pub key_id: Uuid,
    /// `[IV][ciphertext+tag]`, base64 (standard alphabet).
    pub ciphertext: String,
}

/// The single logical data key, wrapped under the current key set.
///
/// Maps to the `wrapped_secrets` table (a single row):
/// - id: SMALLINT PRIMARY KEY CHECK (id = 1)
/// - version: BIGINT NOT NULL (compare-and-swap counter)
/// - entries: JSONB NOT NULL
/// - updated_at: TIMESTAMPTZ NOT NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedSecret {
    pub version: i64,
    pub entries: Vec<WrappedEntry>,
    pub updated_at: DateTime<Utc>,
}

impl WrappedSecret {
    /// Ids of the keys this secret is wrapped under, in entry order.
    pub fn key_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.key_id).collect()
    }

    pub fn entry_for(&self, key_id: Uuid) -> Option<&WrappedEntry> {
        self.entries.iter().find(|e| e.key_id == key_id)
    }
}

/// Repository trait for the key store.
///
/// Failures surface as `AppError`; the key lifecycle manager treats every one
/// of them as "persistence unavailable" and fails closed.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Load all retained keys, oldest first.
    async fn load_keys(&self) -> Result<Vec<EncryptionKey>, AppError>;

    /// Persist a new key.
    async fn save_key(&self, key: &EncryptionKey) -> Result<(), AppError>;

    /// Delete a key by id. Deleting an unknown id is not an error.
    async fn delete_key(&self, key_id: Uuid) -> Result<(), AppError>;

    /// Load the wrapped data key, if one was ever written.
    async fn load_wrapped_secret(&self) -> Result<Option<WrappedSecret>, AppError>;

    /// Persist `secret` if the stored record is still at `secret.version - 1`
    /// (or absent when `secret.version == 1`).
    ///
    /// Returns `false` when another writer got there first.
    async fn save_wrapped_secret(&self, secret: &WrappedSecret) -> Result<bool, AppError>;
}

/// A held cross-process rotation lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub token: String,
}

/// Cross-process mutual exclusion around key rotation.
#[async_trait]
pub trait RotationLock: Send + Sync {
    /// Try to take the lease without waiting. `None` means someone else holds it.
    async fn try_acquire(&self) -> Result<Option<LockLease>, AppError>;

    /// Release a lease taken by `try_acquire`.
    async fn release(&self, lease: LockLease) -> Result<(), AppError>;
}
