//! In-Memory Repositories
//!
//! Process-local implementations of the key store and user repositories.
//! They back single-node development setups and the test suites, and honour
//! the same contracts as the PostgreSQL implementations (ordering, CAS,
//! uniqueness).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{EncryptionKey, KeyRepository, User, UserRepository, WrappedSecret};
use crate::shared::error::AppError;

#[derive(Default)]
struct KeyState {
    keys: Vec<EncryptionKey>,
    wrapped: Option<WrappedSecret>,
}

/// In-memory key store.
#[derive(Default)]
pub struct InMemoryKeyRepository {
    state: Mutex<KeyState>,
    unavailable: AtomicBool,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Ids of the stored keys, oldest first.
    pub fn key_ids(&self) -> Vec<Uuid> {
        self.sorted_keys().iter().map(|k| k.key_id).collect()
    }

    /// Snapshot of the stored wrapped secret.
    pub fn wrapped_secret(&self) -> Option<WrappedSecret> {
        self.state.lock().wrapped.clone()
    }

    fn sorted_keys(&self) -> Vec<EncryptionKey> {
        let mut keys = self.state.lock().keys.clone();
        keys.sort_by_key(|k| (k.created_at, k.key_id));
        keys
    }

    fn check(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("in-memory key store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn load_keys(&self) -> Result<Vec<EncryptionKey>, AppError> {
        self.check()?;
        Ok(self.sorted_keys())
    }

    async fn save_key(&self, key: &EncryptionKey) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.lock();
        if state.keys.iter().any(|k| k.key_id == key.key_id) {
            return Err(AppError::Conflict(format!("key {} already exists", key.key_id)));
        }
        state.keys.push(key.clone());
        Ok(())
    }

    async fn delete_key(&self, key_id: Uuid) -> Result<(), AppError> {
        self.check()?;
        self.state.lock().keys.retain(|k| k.key_id != key_id);
        Ok(())
    }

    async fn load_wrapped_secret(&self) -> Result<Option<WrappedSecret>, AppError> {
        self.check()?;
        Ok(self.state.lock().wrapped.clone())
    }

    async fn save_wrapped_secret(&self, secret: &WrappedSecret) -> Result<bool, AppError> {
        self.check()?;
        let mut state = self.state.lock();
        let current = state.wrapped.as_ref().map(|w| w.version).unwrap_or(0);
        if current != secret.version - 1 {
            return Ok(false);
        }
        state.wrapped = Some(secret.clone());
        Ok(true)
    }
}

/// In-memory user store keyed by id.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, User>,
    // Serializes uniqueness checks in `create`.
    create_lock: Mutex<()>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by<F>(&self, predicate: F) -> Option<User>
    where
        F: Fn(&User) -> bool,
    {
        self.users
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut User),
    {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;
        apply(&mut *user);
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_by(|u| u.username == username))
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_by(|u| u.handle == handle))
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let _guard = self.create_lock.lock();
        let duplicate = self.users.contains_key(&user.id)
            || self
                .find_by(|u| u.username == user.username || u.handle == user.handle)
                .is_some();
        if duplicate {
            return Err(AppError::Conflict(format!("user {} already exists", user.username)));
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        self.update(id, |user| user.password_hash = password_hash.to_string())
    }

    async fn update_token(&self, id: &str, token: &str) -> Result<(), AppError> {
        self.update(id, |user| user.token = Some(token.to_string()))
    }
}
