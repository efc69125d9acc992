//! Key Lifecycle Service
//!
//! Owns the envelope-encryption hierarchy: a rotating set of wrapping keys
//! protecting one logical data key.
//!
//! Reading the data key ([`KeyLifecycleManager::fetch_data_key`]) never
//! writes. Rotation and retirement happen in
//! [`KeyLifecycleManager::maintain`], which callers trigger from a scheduler
//! or, with lazy rotation enabled, from [`KeyLifecycleManager::current_data_key`].
//!
//! Write ordering inside `maintain`:
//!
//! ```text
//! load keys + wrapped secret
//!   -> unwrap data key (Corrupt if no retained key opens it)
//!   -> save new wrapping key (if rotation is due)
//!   -> CAS-save data key wrapped under surviving keys
//!   -> delete retired keys            (only if the CAS write applied)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{KeyStoreSettings, RotationMode};
use crate::domain::{
    EncryptionKey, KeyRepository, RotationLock, WrappedEntry, WrappedSecret,
};
use crate::infrastructure::metrics;
use crate::shared::clock::Clock;
use crate::shared::crypto::{self, CryptoError, SecretKey};
use crate::shared::error::AppError;

/// The symmetric key that seals session tokens.
pub type DataKey = SecretKey;

/// Key store errors
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// Persistence unreachable. Fatal for the current call; callers fail closed.
    #[error("Key store unavailable: {0}")]
    Unavailable(#[from] AppError),

    /// No retained key opens the wrapped data key. Needs an operator.
    #[error("Key store corrupt: no retained key decrypts the wrapped data key")]
    Corrupt,

    #[error("Key store crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<KeyStoreError> for AppError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::Unavailable(e) => AppError::Unavailable(format!("key store: {}", e)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Rotation and retirement thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    /// Rotate once the active key is older than this.
    pub rotation_interval: Duration,
    /// Delete a non-active key once it is older than this.
    pub retirement_age: Duration,
    /// Run maintenance from inside `current_data_key`.
    pub lazy_rotation: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::hours(24),
            retirement_age: Duration::days(7),
            lazy_rotation: true,
        }
    }
}

impl From<&KeyStoreSettings> for KeyPolicy {
    fn from(settings: &KeyStoreSettings) -> Self {
        Self {
            rotation_interval: Duration::hours(settings.rotation_interval_hours),
            retirement_age: Duration::hours(settings.retirement_age_hours),
            lazy_rotation: settings.rotation_mode == RotationMode::Lazy,
        }
    }
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceOutcome {
    /// Nothing was due.
    Idle,
    /// The store was empty; a first key and data key were created.
    Initialized { key_id: Uuid },
    /// The data key was re-wrapped, optionally under a new key, and retired
    /// keys were deleted afterwards.
    Rewrapped {
        rotated: Option<Uuid>,
        retired: Vec<Uuid>,
    },
    /// Another writer updated the wrapped secret first; nothing was deleted.
    Conflict,
    /// Another process holds the rotation lease.
    Contended,
}

impl MaintenanceOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initialized { .. } => "initialized",
            Self::Rewrapped { rotated: Some(_), .. } => "rotated",
            Self::Rewrapped { rotated: None, .. } => "rewrapped",
            Self::Conflict => "conflict",
            Self::Contended => "contended",
        }
    }
}

/// What a maintenance pass would do against a given state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationPlan {
    pub rotate: bool,
    pub retiring: Vec<Uuid>,
    pub rewrap: bool,
}

impl RotationPlan {
    pub fn is_due(&self) -> bool {
        self.rewrap
    }
}

/// Key lifecycle manager
///
/// One instance per process, shared by reference with every consumer.
pub struct KeyLifecycleManager<R>
where
    R: KeyRepository,
{
    repo: Arc<R>,
    clock: Arc<dyn Clock>,
    policy: KeyPolicy,
    rotation_lock: Option<Arc<dyn RotationLock>>,
    /// Serializes writers inside this process.
    writer: Mutex<()>,
}

impl<R> KeyLifecycleManager<R>
where
    R: KeyRepository,
{
    /// Create a new KeyLifecycleManager
    pub fn new(repo: Arc<R>, clock: Arc<dyn Clock>, policy: KeyPolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
            rotation_lock: None,
            writer: Mutex::new(()),
        }
    }

    /// Also serialize maintenance across processes through `lock`.
    pub fn with_rotation_lock(mut self, lock: Arc<dyn RotationLock>) -> Self {
        self.rotation_lock = Some(lock);
        self
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    /// Generate, persist and return a new wrapping key.
    ///
    /// Existing keys are left untouched; the new key protects nothing until
    /// the data key is re-wrapped under it.
    pub async fn rotate_key(&self) -> Result<EncryptionKey, KeyStoreError> {
        let key = EncryptionKey::generate(self.clock.now());
        self.repo.save_key(&key).await?;

        metrics::record_key_rotation();
        info!(key_id = %key.key_id, "Created wrapping key");
        Ok(key)
    }

    /// Read the data key without side effects.
    ///
    /// Returns `None` when the store has never been initialized.
    pub async fn fetch_data_key(&self) -> Result<Option<DataKey>, KeyStoreError> {
        let (keys, wrapped) = self.load_state().await?;
        match wrapped {
            Some(wrapped) => Self::unwrap_data_key(&keys, &wrapped).map(Some),
            None => Ok(None),
        }
    }

    /// The data key, initializing the store on first use.
    ///
    /// With lazy rotation enabled this also runs a maintenance pass when one
    /// is due. A failed pass is logged and left for the next access; the
    /// already-unwrapped data key is still returned.
    pub async fn current_data_key(&self) -> Result<DataKey, KeyStoreError> {
        let (keys, wrapped) = self.load_state().await?;
        let Some(wrapped) = wrapped else {
            return self.bootstrap().await;
        };

        let data_key = Self::unwrap_data_key(&keys, &wrapped)?;

        if self.policy.lazy_rotation && self.plan(self.clock.now(), &keys, &wrapped).is_due() {
            match self.maintain().await {
                Ok(outcome) => debug!(outcome = outcome.as_label(), "Lazy key maintenance"),
                Err(e) => warn!(error = %e, "Lazy key maintenance failed, retrying on next access"),
            }
        }

        Ok(data_key)
    }

    /// Whether a maintenance pass would change anything right now.
    pub async fn is_maintenance_due(&self) -> Result<bool, KeyStoreError> {
        let (keys, wrapped) = self.load_state().await?;
        Ok(match wrapped {
            Some(wrapped) => self.plan(self.clock.now(), &keys, &wrapped).is_due(),
            None => true,
        })
    }

    /// Rotate, re-wrap and retire as the policy requires.
    #[instrument(skip(self))]
    pub async fn maintain(&self) -> Result<MaintenanceOutcome, KeyStoreError> {
        let _writer = self.writer.lock().await;

        let lease = match &self.rotation_lock {
            Some(lock) => match lock.try_acquire().await? {
                Some(lease) => Some(lease),
                None => {
                    debug!("Rotation lease held elsewhere, skipping maintenance");
                    metrics::record_maintenance(MaintenanceOutcome::Contended.as_label());
                    return Ok(MaintenanceOutcome::Contended);
                }
            },
            None => None,
        };

        let result = self.maintain_locked().await;

        if let (Some(lock), Some(lease)) = (&self.rotation_lock, lease) {
            if let Err(e) = lock.release(lease).await {
                warn!(error = %e, "Failed to release rotation lease");
            }
        }

        match &result {
            Ok(outcome) => metrics::record_maintenance(outcome.as_label()),
            Err(KeyStoreError::Corrupt) => {
                error!("Wrapped data key cannot be opened by any retained key");
                metrics::record_maintenance("failed");
            }
            Err(e) => {
                warn!(error = %e, "Key maintenance failed");
                metrics::record_maintenance("failed");
            }
        }
        result
    }

    /// Decide what maintenance would do for the given state.
    pub fn plan(
        &self,
        now: DateTime<Utc>,
        keys: &[EncryptionKey],
        wrapped: &WrappedSecret,
    ) -> RotationPlan {
        let Some(active) = keys.last() else {
            return RotationPlan::default();
        };

        let rotate = active.age(now) > self.policy.rotation_interval;

        // The active key only becomes retirable once a newer key replaces it.
        let retiring: Vec<Uuid> = keys
            .iter()
            .filter(|k| rotate || k.key_id != active.key_id)
            .filter(|k| k.age(now) > self.policy.retirement_age)
            .map(|k| k.key_id)
            .collect();

        let survivors: HashSet<Uuid> = keys
            .iter()
            .map(|k| k.key_id)
            .filter(|id| !retiring.contains(id))
            .collect();
        let covered: HashSet<Uuid> = wrapped.key_ids().into_iter().collect();

        let rewrap = rotate || !retiring.is_empty() || covered != survivors;

        RotationPlan {
            rotate,
            retiring,
            rewrap,
        }
    }

    async fn maintain_locked(&self) -> Result<MaintenanceOutcome, KeyStoreError> {
        let (keys, wrapped) = self.load_state().await?;
        let Some(wrapped) = wrapped else {
            return Ok(match self.initialize(keys).await? {
                Some((_, key_id)) => MaintenanceOutcome::Initialized { key_id },
                None => MaintenanceOutcome::Conflict,
            });
        };

        let data_key = Self::unwrap_data_key(&keys, &wrapped)?;
        let now = self.clock.now();
        let plan = self.plan(now, &keys, &wrapped);
        if !plan.is_due() {
            return Ok(MaintenanceOutcome::Idle);
        }

        let mut survivors: Vec<EncryptionKey> = keys
            .into_iter()
            .filter(|k| !plan.retiring.contains(&k.key_id))
            .collect();

        let rotated = if plan.rotate {
            let key = self.rotate_key().await?;
            let key_id = key.key_id;
            survivors.push(key);
            Some(key_id)
        } else {
            None
        };

        let next = Self::wrap_data_key(&data_key, &survivors, wrapped.version + 1, now)?;
        if !self.repo.save_wrapped_secret(&next).await? {
            warn!(
                version = next.version,
                "Wrapped secret changed concurrently, leaving retired keys in place"
            );
            return Ok(MaintenanceOutcome::Conflict);
        }

        // The data key no longer depends on the retiring keys.
        for key_id in &plan.retiring {
            self.repo.delete_key(*key_id).await?;
            info!(%key_id, "Deleted retired wrapping key");
        }
        metrics::record_key_retirements(plan.retiring.len());
        metrics::set_retained_keys(survivors.len());

        info!(
            version = next.version,
            rotated = ?rotated,
            retired = plan.retiring.len(),
            "Re-wrapped data key"
        );
        Ok(MaintenanceOutcome::Rewrapped {
            rotated,
            retired: plan.retiring,
        })
    }

    /// First-use initialization, serialized with maintenance.
    async fn bootstrap(&self) -> Result<DataKey, KeyStoreError> {
        let _writer = self.writer.lock().await;

        let (keys, wrapped) = self.load_state().await?;
        if let Some(wrapped) = wrapped {
            return Self::unwrap_data_key(&keys, &wrapped);
        }

        match self.initialize(keys).await? {
            Some((data_key, _)) => Ok(data_key),
            // Another process initialized the store between our read and write.
            None => self.fetch_data_key().await?.ok_or(KeyStoreError::Corrupt),
        }
    }

    /// Create a data key and wrap it under `keys`, adding a key if there is none.
    ///
    /// Returns `None` if another writer stored a wrapped secret first.
    async fn initialize(
        &self,
        mut keys: Vec<EncryptionKey>,
    ) -> Result<Option<(DataKey, Uuid)>, KeyStoreError> {
        if keys.is_empty() {
            keys.push(self.rotate_key().await?);
        }
        let active_id = keys.last().map(|k| k.key_id).ok_or(KeyStoreError::Corrupt)?;

        let data_key = SecretKey::generate();
        let secret = Self::wrap_data_key(&data_key, &keys, 1, self.clock.now())?;
        if !self.repo.save_wrapped_secret(&secret).await? {
            return Ok(None);
        }

        metrics::set_retained_keys(keys.len());
        info!(key_id = %active_id, "Initialized key store");
        Ok(Some((data_key, active_id)))
    }

    async fn load_state(&self) -> Result<(Vec<EncryptionKey>, Option<WrappedSecret>), KeyStoreError> {
        let keys = self.repo.load_keys().await?;
        let wrapped = self.repo.load_wrapped_secret().await?;
        Ok((keys, wrapped))
    }

    /// Open the wrapped data key with any retained key.
    pub fn unwrap_data_key(
        keys: &[EncryptionKey],
        wrapped: &WrappedSecret,
    ) -> Result<DataKey, KeyStoreError> {
        for key in keys {
            let Some(entry) = wrapped.entry_for(key.key_id) else {
                continue;
            };
            let Ok(sealed) = STANDARD.decode(&entry.ciphertext) else {
                warn!(key_id = %key.key_id, "Wrapped entry is not valid base64");
                continue;
            };
            match crypto::open(&key.key_material, &sealed, &key.wrap_aad()) {
                Ok(mut plaintext) => {
                    let data_key = SecretKey::from_slice(&plaintext);
                    zeroize::Zeroize::zeroize(&mut plaintext);
                    match data_key {
                        Ok(data_key) => return Ok(data_key),
                        Err(e) => warn!(key_id = %key.key_id, error = %e, "Unwrapped data key has wrong length"),
                    }
                }
                Err(e) => warn!(key_id = %key.key_id, error = %e, "Wrapping key failed to open data key"),
            }
        }
        Err(KeyStoreError::Corrupt)
    }

    /// Seal `data_key` once under each of `keys`.
    pub fn wrap_data_key(
        data_key: &DataKey,
        keys: &[EncryptionKey],
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<WrappedSecret, KeyStoreError> {
        let entries = keys
            .iter()
            .map(|key| {
                crypto::seal(&key.key_material, data_key.as_bytes(), &key.wrap_aad()).map(
                    |sealed| WrappedEntry {
                        key_id: key.key_id,
                        ciphertext: STANDARD.encode(sealed),
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WrappedSecret {
            version,
            entries,
            updated_at: now,
        })
    }
}
