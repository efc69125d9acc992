//! Account Service
//!
//! Registration, login and password changes. Every flow ends by handing the
//! subject's credentials to the [`AuthService`] for a session token.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument};
use validator::{Validate, ValidationError};

use super::auth_service::{AuthError, AuthService};
use crate::domain::{EntityKind, User, UserRepository};
use crate::shared::clock::Clock;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_message;

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{3,32}$").expect("Invalid username pattern"));

/// Usernames are 3-32 of `[A-Za-z0-9._-]` and may not start with punctuation.
fn validate_username(username: &str) -> Result<(), ValidationError> {
    let leading_punctuation = username.starts_with(&['-', '_', '.'][..]);
    if !USERNAME_PATTERN.is_match(username) || leading_punctuation {
        return Err(ValidationError::new("username").with_message(
            "Username must be 3-32 letters, digits, '.', '_' or '-', not starting with punctuation"
                .into(),
        ));
    }
    Ok(())
}

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
}

/// Login request. `identifier` is a username or a handle.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Identifier is required"))]
    pub identifier: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Validate)]
struct PasswordChange {
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    new_password: String,
}

/// Account errors
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Username taken")]
    UsernameTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    Disabled,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("User store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AccountError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(validation_message(&errors))
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) => AppError::Validation(msg),
            AccountError::UsernameTaken => AppError::Conflict("Username taken".into()),
            AccountError::InvalidCredentials | AccountError::Disabled => {
                AppError::Unauthorized(err.to_string())
            }
            AccountError::UserNotFound => AppError::NotFound("User not found".into()),
            AccountError::Auth(e) => e.into(),
            AccountError::Unavailable(msg) => AppError::Unavailable(msg),
            AccountError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

fn store_error(e: AppError) -> AccountError {
    AccountError::Unavailable(e.to_string())
}

/// Account service trait for dependency injection
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Create an account and its first session token.
    async fn register(&self, request: RegisterRequest) -> Result<(User, String), AccountError>;

    /// Check credentials and return a session token, reusing the stored one
    /// while it is still valid.
    async fn login(&self, request: LoginRequest) -> Result<String, AccountError>;

    /// Replace the password. Every token issued before the change stops
    /// verifying; the returned token is the only valid one.
    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, AccountError>;
}

/// AccountService implementation
pub struct AccountServiceImpl<U>
where
    U: UserRepository,
{
    user_repo: Arc<U>,
    auth: Arc<dyn AuthService>,
    id_generator: Arc<SnowflakeGenerator>,
    clock: Arc<dyn Clock>,
    handle_domain: String,
}

impl<U> AccountServiceImpl<U>
where
    U: UserRepository,
{
    /// Create a new AccountServiceImpl
    pub fn new(
        user_repo: Arc<U>,
        auth: Arc<dyn AuthService>,
        id_generator: Arc<SnowflakeGenerator>,
        clock: Arc<dyn Clock>,
        handle_domain: impl Into<String>,
    ) -> Self {
        Self {
            user_repo,
            auth,
            id_generator,
            clock,
            handle_domain: handle_domain.into(),
        }
    }

    /// Hash a password using Argon2id
    fn hash_password(&self, password: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AccountError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AccountError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    async fn remember_token(&self, user: &User, token: &str) -> Result<(), AccountError> {
        if user.token.as_deref() == Some(token) {
            return Ok(());
        }
        self.user_repo
            .update_token(&user.id, token)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl<U> AccountService for AccountServiceImpl<U>
where
    U: UserRepository + 'static,
{
    #[instrument(skip(self, request), fields(username = %request.username))]
    async fn register(&self, request: RegisterRequest) -> Result<(User, String), AccountError> {
        request.validate()?;

        if self
            .user_repo
            .find_by_username(&request.username)
            .await
            .map_err(store_error)?
            .is_some()
        {
            return Err(AccountError::UsernameTaken);
        }

        let password_hash = self.hash_password(&request.password)?;
        let now = self.clock.now();
        let user = User {
            id: self.id_generator.next(EntityKind::User).to_string(),
            handle: format!("{}.{}", request.username, self.handle_domain),
            username: request.username,
            password_hash,
            token: None,
            disabled: false,
            created_at: now,
            updated_at: now,
        };

        let mut created = self.user_repo.create(&user).await.map_err(|e| match e {
            AppError::Conflict(_) => AccountError::UsernameTaken,
            other => store_error(other),
        })?;

        let token = self
            .auth
            .issue(&created.id, &created.handle, &created.password_hash)
            .await?;
        self.remember_token(&created, &token).await?;
        created.token = Some(token.clone());

        info!(user_id = %created.id, "Registered account");
        Ok((created, token))
    }

    #[instrument(skip(self, request), fields(identifier = %request.identifier))]
    async fn login(&self, request: LoginRequest) -> Result<String, AccountError> {
        request.validate()?;

        let user = match self
            .user_repo
            .find_by_username(&request.identifier)
            .await
            .map_err(store_error)?
        {
            Some(user) => Some(user),
            None => self
                .user_repo
                .find_by_handle(&request.identifier)
                .await
                .map_err(store_error)?,
        }
        .ok_or(AccountError::InvalidCredentials)?;

        if !self.verify_password(&request.password, &user.password_hash)? {
            return Err(AccountError::InvalidCredentials);
        }
        if user.disabled {
            return Err(AccountError::Disabled);
        }

        let token = self.auth.ensure_token(&user).await?;
        self.remember_token(&user, &token).await?;
        Ok(token)
    }

    #[instrument(skip(self, current_password, new_password))]
    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, AccountError> {
        PasswordChange {
            new_password: new_password.to_string(),
        }
        .validate()?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await
            .map_err(store_error)?
            .ok_or(AccountError::UserNotFound)?;

        if !self.verify_password(current_password, &user.password_hash)? {
            return Err(AccountError::InvalidCredentials);
        }

        let password_hash = self.hash_password(new_password)?;
        self.user_repo
            .update_password_hash(&user.id, &password_hash)
            .await
            .map_err(store_error)?;

        let token = self
            .auth
            .issue(&user.id, &user.handle, &password_hash)
            .await?;
        self.user_repo
            .update_token(&user.id, &token)
            .await
            .map_err(store_error)?;

        info!(user_id = %user.id, "Changed password");
        Ok(token)
    }
}
