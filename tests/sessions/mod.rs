//! Session and Key Store Tests
//!
//! End-to-end behaviour of token issuance and verification while wrapping
//! keys rotate and retire underneath.

use std::collections::HashSet;

use chrono::Duration;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use delta_server::application::services::{
    AuthError, KeyLifecycleManager, KeyPolicy, KeyStoreError, LoginRequest, MaintenanceOutcome,
};
use delta_server::domain::KeyRepository;

use crate::common::{TestApp, PASSWORD};

fn login(identifier: &str) -> LoginRequest {
    LoginRequest {
        identifier: identifier.to_string(),
        password: PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn test_token_survives_full_retention_window() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;
    let first_key = app.key_repo.key_ids()[0];

    // Daily traffic for two weeks; lazy rotation runs on access.
    for _ in 0..14 {
        app.clock.advance(Duration::hours(25));
        assert_eq!(app.auth.verify(&token).await.unwrap().id, user.id);
    }

    assert!(!app.key_repo.key_ids().contains(&first_key));
}

#[tokio::test]
async fn test_exactly_one_active_key_after_rotations() {
    let app = TestApp::new();
    app.register("alice").await;

    for _ in 0..5 {
        app.clock.advance(Duration::hours(25));
        app.keys.current_data_key().await.unwrap();

        let keys = app.key_repo.load_keys().await.unwrap();
        let newest = keys.iter().map(|k| k.created_at).max().unwrap();
        assert_eq!(keys.iter().filter(|k| k.created_at == newest).count(), 1);
    }
}

#[tokio::test]
async fn test_wrap_covers_exactly_retained_keys() {
    let app = TestApp::new();
    app.register("alice").await;

    for _ in 0..10 {
        app.clock.advance(Duration::hours(25));
        app.keys.maintain().await.unwrap();

        let retained: HashSet<Uuid> = app.key_repo.key_ids().into_iter().collect();
        let covered: HashSet<Uuid> = app
            .key_repo
            .wrapped_secret()
            .unwrap()
            .key_ids()
            .into_iter()
            .collect();
        assert_eq!(covered, retained);
    }
}

#[tokio::test]
async fn test_zero_retention_never_loses_data_key() {
    let app = TestApp::with_policy(KeyPolicy {
        retirement_age: Duration::zero(),
        lazy_rotation: false,
        ..KeyPolicy::default()
    });
    let (user, token) = app.register("alice").await;

    for _ in 0..3 {
        app.clock.advance(Duration::hours(25));
        app.keys.maintain().await.unwrap();
        assert_eq!(app.key_repo.key_ids().len(), 1);
    }

    assert_eq!(app.auth.verify(&token).await.unwrap().id, user.id);
}

#[tokio::test]
async fn test_deleting_every_key_is_corrupt_not_a_rejection() {
    let app = TestApp::new();
    let (_, token) = app.register("alice").await;

    for key_id in app.key_repo.key_ids() {
        app.key_repo.delete_key(key_id).await.unwrap();
    }

    let err = app.auth.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::KeyStore(KeyStoreError::Corrupt)));
    assert!(!err.is_rejection());
}

#[tokio::test]
async fn test_second_manager_sees_same_data_key() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;

    // A second process sharing the store.
    let other = KeyLifecycleManager::new(
        app.key_repo.clone(),
        app.clock.clone(),
        KeyPolicy::default(),
    );

    assert_eq!(
        other.current_data_key().await.unwrap(),
        app.keys.current_data_key().await.unwrap()
    );
    app.clock.advance(Duration::hours(25));
    other.maintain().await.unwrap();
    assert_eq!(app.auth.verify(&token).await.unwrap().id, user.id);
}

#[tokio::test]
async fn test_rotation_concurrent_with_verification() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;
    app.clock.advance(Duration::hours(25));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let auth = app.auth.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move { auth.verify(&token).await }));
    }
    let keys = app.keys.clone();
    let maintenance = tokio::spawn(async move { keys.maintain().await });

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().id, user.id);
    }
    let outcome = maintenance.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        MaintenanceOutcome::Idle | MaintenanceOutcome::Rewrapped { .. }
    ));
    assert_eq!(app.key_repo.key_ids().len(), 2);
}

#[tokio::test]
async fn test_login_reuses_token_until_it_expires() {
    let app = TestApp::new();
    let (_, issued) = app.register("alice").await;

    let reused = app.accounts.login(login("alice")).await.unwrap();
    assert_eq!(reused, issued);

    app.clock.advance(Duration::days(366));
    let replaced = app.accounts.login(login("alice.delta.noro.cc")).await.unwrap();

    assert_ne!(replaced, issued);
    assert!(app.auth.verify(&replaced).await.is_ok());
    assert!(matches!(
        app.auth.verify(&issued).await.unwrap_err(),
        AuthError::Expired
    ));
}

#[tokio::test]
async fn test_password_change_revokes_every_prior_token() {
    let app = TestApp::new();
    let (user, first) = app.register("alice").await;
    let second = app
        .auth
        .issue(&user.id, &user.handle, &user.password_hash)
        .await
        .unwrap();

    let fresh = app
        .accounts
        .change_password(&user.id, PASSWORD, "a brand new password")
        .await
        .unwrap();

    for stale in [first, second] {
        assert!(matches!(
            app.auth.verify(&stale).await.unwrap_err(),
            AuthError::Revoked
        ));
    }
    assert_eq!(app.auth.verify(&fresh).await.unwrap().id, user.id);
}
