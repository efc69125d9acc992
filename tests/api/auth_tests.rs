//! Bearer Extractor Tests

use axum::http::StatusCode;
use chrono::Duration;

use delta_server::presentation::authenticate_handshake;
use delta_server::shared::error::AppError;

use crate::common::{assert_unauthorized, body_json, TestApp, ME, PASSWORD};

#[tokio::test]
async fn test_valid_token_resolves_subject() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;

    let response = app.get_auth(ME, &token).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], user.id.as_str());
    assert_eq!(body["handle"], "alice.delta.noro.cc");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    let app = TestApp::new();

    assert_unauthorized(app.get(ME).await).await;
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let app = TestApp::new();
    app.register("alice").await;

    assert_unauthorized(app.get_auth(ME, "v1.garbage").await).await;
}

#[tokio::test]
async fn test_revoked_token_is_unauthorized() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;
    app.accounts
        .change_password(&user.id, PASSWORD, "a brand new password")
        .await
        .unwrap();

    assert_unauthorized(app.get_auth(ME, &token).await).await;
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let app = TestApp::new();
    let (_, token) = app.register("alice").await;

    app.clock.advance(Duration::days(365));

    assert_unauthorized(app.get_auth(ME, &token).await).await;
}

#[tokio::test]
async fn test_rejections_share_one_body() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;
    app.accounts
        .change_password(&user.id, PASSWORD, "a brand new password")
        .await
        .unwrap();

    let revoked = body_json(app.get_auth(ME, &token).await).await;
    let malformed = body_json(app.get_auth(ME, "v1.AAAA").await).await;

    assert_eq!(revoked, malformed);
}

#[tokio::test]
async fn test_unavailable_key_store_is_not_a_rejection() {
    let app = TestApp::new();
    let (_, token) = app.register("alice").await;

    app.key_repo.set_unavailable(true);
    let response = app.get_auth(ME, &token).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_handshake_accepts_bare_and_bearer_forms() {
    let app = TestApp::new();
    let (user, token) = app.register("alice").await;

    let bare = authenticate_handshake(app.auth.as_ref(), &token).await.unwrap();
    let bearer = authenticate_handshake(app.auth.as_ref(), &format!("Bearer {}", token))
        .await
        .unwrap();

    assert_eq!(bare.id, user.id);
    assert_eq!(bearer.id, user.id);
}

#[tokio::test]
async fn test_handshake_rejects_empty_credential() {
    let app = TestApp::new();

    let err = authenticate_handshake(app.auth.as_ref(), "  ").await.unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(_)));
}
