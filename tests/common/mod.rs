//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tower::ServiceExt;

use delta_server::application::services::{
    AccountService, AccountServiceImpl, AuthService, KeyLifecycleManager, KeyPolicy,
    RegisterRequest, TokenAuthenticator,
};
use delta_server::domain::User;
use delta_server::infrastructure::repositories::{InMemoryKeyRepository, InMemoryUserRepository};
use delta_server::presentation::create_router;
use delta_server::shared::clock::ManualClock;
use delta_server::shared::snowflake::SnowflakeGenerator;

/// Endpoint returning the bearer token's subject
pub const ME: &str = "/api/v1/users/@me";

pub const PASSWORD: &str = "correct horse battery";

/// A whole-millisecond starting instant, so token expiry boundaries are exact.
pub fn start_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

/// Test application backed by in-memory stores and a manual clock
pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub key_repo: Arc<InMemoryKeyRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub keys: Arc<KeyLifecycleManager<InMemoryKeyRepository>>,
    pub auth: Arc<dyn AuthService>,
    pub accounts: Arc<dyn AccountService>,
}

impl TestApp {
    /// Default policy: 24h rotation, 7d retirement, lazy rotation.
    pub fn new() -> Self {
        Self::with_policy(KeyPolicy::default())
    }

    pub fn with_policy(policy: KeyPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let key_repo = Arc::new(InMemoryKeyRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());

        let keys = Arc::new(KeyLifecycleManager::new(key_repo.clone(), clock.clone(), policy));
        let auth: Arc<dyn AuthService> = Arc::new(TokenAuthenticator::new(
            keys.clone(),
            users.clone(),
            clock.clone(),
            Duration::days(365),
        ));
        let accounts: Arc<dyn AccountService> = Arc::new(AccountServiceImpl::new(
            users.clone(),
            auth.clone(),
            Arc::new(SnowflakeGenerator::default()),
            clock.clone(),
            "delta.noro.cc",
        ));

        let router = create_router(auth.clone(), keys.clone());

        Self {
            router,
            clock,
            key_repo,
            users,
            keys,
            auth,
            accounts,
        }
    }

    /// Register `username` with [`PASSWORD`].
    pub async fn register(&self, username: &str) -> (User, String) {
        self.accounts
            .register(RegisterRequest {
                username: username.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("registration failed")
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Make an authenticated GET request
    pub async fn get_auth(&self, uri: &str, token: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a response is the generic 401 body.
pub async fn assert_unauthorized(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Unauthorized");
}
