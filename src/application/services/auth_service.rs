//! Authentication Service
//!
//! Issues and verifies opaque session tokens.
//!
//! A token is the JSON payload sealed under the current data key:
//!
//! ```text
//! "v1." + base64url_nopad( IV(12) || AES-256-GCM(payload) )
//! ```
//!
//! The payload snapshots the subject's handle and password hash. Verification
//! compares the snapshot with the live record, so changing either revokes
//! every token issued before the change without any blacklist.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::key_lifecycle::{DataKey, KeyLifecycleManager, KeyStoreError};
use crate::domain::{KeyRepository, User, UserRepository};
use crate::infrastructure::metrics;
use crate::shared::clock::Clock;
use crate::shared::crypto;
use crate::shared::error::AppError;

/// Version prefix of the current token format.
pub const TOKEN_PREFIX: &str = "v1.";

const TOKEN_AAD: &[u8] = b"delta.session.v1";

/// Authentication service trait for dependency injection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Seal a new token for the subject's current credentials.
    async fn issue(
        &self,
        subject_id: &str,
        handle: &str,
        password_hash: &str,
    ) -> Result<String, AuthError>;

    /// Resolve a token to its live subject.
    async fn verify(&self, token: &str) -> Result<User, AuthError>;

    /// The user's stored token while it still verifies, otherwise a new one.
    async fn ensure_token(&self, user: &User) -> Result<String, AuthError>;
}

/// Decrypted token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokenPayload {
    pub subject_id: String,
    pub handle: String,
    pub password_hash: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token revoked")]
    Revoked,

    #[error("Token expired")]
    Expired,

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("Subject lookup unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The token itself was rejected, as opposed to the check failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Malformed | Self::Revoked | Self::Expired)
    }

    fn as_label(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            _ => "error",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Malformed | AuthError::Revoked | AuthError::Expired => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::KeyStore(e) => e.into(),
            AuthError::Unavailable(msg) => AppError::Unavailable(msg),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Token authenticator
pub struct TokenAuthenticator<R, U>
where
    R: KeyRepository,
    U: UserRepository,
{
    keys: Arc<KeyLifecycleManager<R>>,
    user_repo: Arc<U>,
    clock: Arc<dyn Clock>,
    token_lifetime: Duration,
}

impl<R, U> TokenAuthenticator<R, U>
where
    R: KeyRepository,
    U: UserRepository,
{
    /// Create a new TokenAuthenticator
    pub fn new(
        keys: Arc<KeyLifecycleManager<R>>,
        user_repo: Arc<U>,
        clock: Arc<dyn Clock>,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            keys,
            user_repo,
            clock,
            token_lifetime,
        }
    }

    async fn check(&self, token: &str) -> Result<User, AuthError> {
        let data_key = self.keys.current_data_key().await?;
        let payload = decode_token(&data_key, token).ok_or(AuthError::Malformed)?;

        let user = self
            .user_repo
            .find_by_id(&payload.subject_id)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .ok_or(AuthError::Malformed)?;

        if user.disabled || !user.credentials_match(&payload.handle, &payload.password_hash) {
            return Err(AuthError::Revoked);
        }

        if self.clock.now() >= payload.expires_at {
            return Err(AuthError::Expired);
        }

        Ok(user)
    }
}

#[async_trait]
impl<R, U> AuthService for TokenAuthenticator<R, U>
where
    R: KeyRepository + 'static,
    U: UserRepository + 'static,
{
    #[instrument(skip(self, handle, password_hash))]
    async fn issue(
        &self,
        subject_id: &str,
        handle: &str,
        password_hash: &str,
    ) -> Result<String, AuthError> {
        let data_key = self.keys.current_data_key().await?;
        let payload = SessionTokenPayload {
            subject_id: subject_id.to_string(),
            handle: handle.to_string(),
            password_hash: password_hash.to_string(),
            expires_at: self.clock.now() + self.token_lifetime,
        };

        let token = encode_token(&data_key, &payload)?;
        metrics::record_token_issued();
        debug!(expires_at = %payload.expires_at, "Issued session token");
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<User, AuthError> {
        let result = self.check(token).await;
        match &result {
            Ok(user) => {
                metrics::record_token_verification("ok");
                debug!(subject_id = %user.id, "Verified session token");
            }
            Err(e) => {
                metrics::record_token_verification(e.as_label());
                debug!(error = %e, "Rejected session token");
            }
        }
        result
    }

    async fn ensure_token(&self, user: &User) -> Result<String, AuthError> {
        if let Some(token) = &user.token {
            match self.verify(token).await {
                Ok(subject) if subject.id == user.id => return Ok(token.clone()),
                Ok(_) => {}
                Err(e) if e.is_rejection() => {}
                Err(e) => return Err(e),
            }
        }

        self.issue(&user.id, &user.handle, &user.password_hash).await
    }
}

/// Seal `payload` into a token string.
pub fn encode_token(data_key: &DataKey, payload: &SessionTokenPayload) -> Result<String, AuthError> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| AuthError::Internal(format!("Token serialization failed: {}", e)))?;
    let sealed = crypto::seal(data_key, &json, TOKEN_AAD).map_err(KeyStoreError::from)?;

    Ok(format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(sealed)))
}

/// Open a token string. `None` for anything that is not a token sealed under
/// `data_key`.
pub fn decode_token(data_key: &DataKey, token: &str) -> Option<SessionTokenPayload> {
    let body = token.strip_prefix(TOKEN_PREFIX)?;
    let sealed = URL_SAFE_NO_PAD.decode(body).ok()?;
    let json = crypto::open(data_key, &sealed, TOKEN_AAD).ok()?;
    serde_json::from_slice(&json).ok()
}
