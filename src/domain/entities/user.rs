//! User entity and repository trait.
//!
//! Maps to the `users` table in the database schema. A user is the subject
//! of a session token: its handle and password hash are the credentials a
//! token snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Represents a user account in the chat system.
///
/// Maps to the `users` table:
/// - id: TEXT PRIMARY KEY (kind-tagged Snowflake, e.g. `u4523958732169216123`)
/// - username: VARCHAR(32) NOT NULL UNIQUE
/// - handle: VARCHAR(255) NOT NULL UNIQUE
/// - password_hash: VARCHAR(255) NOT NULL
/// - token: TEXT NULL (last issued session token)
/// - disabled: BOOLEAN NOT NULL DEFAULT FALSE
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - updated_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Snowflake ID string (primary key)
    pub id: String,

    /// Username (3-32 characters, unique)
    pub username: String,

    /// Public handle (unique), e.g. `alice.delta.noro.cc`
    pub handle: String,

    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Most recently issued session token, reused while it still verifies
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Disabled accounts keep their row but cannot log in
    #[serde(default)]
    pub disabled: bool,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether a token snapshot of `(handle, password_hash)` still matches.
    pub fn credentials_match(&self, handle: &str, password_hash: &str) -> bool {
        self.handle == handle && self.password_hash == password_hash
    }
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            username: String::new(),
            handle: String::new(),
            password_hash: String::new(),
            token: None,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository trait for User data access operations.
///
/// `find_by_id` is the live-subject lookup every token verification performs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by their Snowflake ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Find a user by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Find a user by handle.
    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>, AppError>;

    /// Create a new user. Fails with `Conflict` on a duplicate username or handle.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Replace the stored password hash.
    async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError>;

    /// Remember the most recently issued session token.
    async fn update_token(&self, id: &str, token: &str) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_user() -> User {
        User {
            id: "u4523958732169216123".to_string(),
            username: "alice".to_string(),
            handle: "alice.delta.noro.cc".to_string(),
            password_hash: "hashed_password".to_string(),
            token: Some("v1.opaque".to_string()),
            ..User::default()
        }
    }

    #[test]
    fn test_user_default() {
        let user = User::default();

        assert!(user.id.is_empty());
        assert!(user.username.is_empty());
        assert!(user.password_hash.is_empty());
        assert!(user.token.is_none());
        assert!(!user.disabled);
    }

    #[test]
    fn test_credentials_match() {
        let user = create_test_user();

        assert!(user.credentials_match("alice.delta.noro.cc", "hashed_password"));
        assert!(!user.credentials_match("alice.delta.noro.cc", "other_hash"));
        assert!(!user.credentials_match("bob.delta.noro.cc", "hashed_password"));
    }

    #[test]
    fn test_user_secrets_not_serialized() {
        let user = create_test_user();

        let serialized = serde_json::to_string(&user).expect("Failed to serialize user");

        assert!(!serialized.contains("password_hash"));
        assert!(!serialized.contains("hashed_password"));
        assert!(!serialized.contains("v1.opaque"));
    }

    #[test]
    fn test_user_serialization_includes_required_fields() {
        let user = create_test_user();

        let serialized = serde_json::to_string(&user).expect("Failed to serialize user");

        assert!(serialized.contains("\"id\":\"u4523958732169216123\""));
        assert!(serialized.contains("\"username\":\"alice\""));
        assert!(serialized.contains("\"handle\":\"alice.delta.noro.cc\""));
    }
}
