//! Health and Metrics Endpoint Tests

use axum::http::StatusCode;

use delta_server::domain::KeyRepository;

use crate::common::{body_json, TestApp};

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.get("/health/live").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "alive");
}

#[tokio::test]
async fn test_readiness_waits_for_first_key() {
    let app = TestApp::new();

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["key_store"], "uninitialized");

    app.register("alice").await;

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ready");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_store() {
    let app = TestApp::new();
    app.register("alice").await;
    app.key_repo.set_unavailable(true);

    let response = app.get("/health/ready").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["key_store"], "unavailable");
}

#[tokio::test]
async fn test_readiness_reports_corrupt_store() {
    let app = TestApp::new();
    app.register("alice").await;
    for key_id in app.key_repo.key_ids() {
        app.key_repo.delete_key(key_id).await.unwrap();
    }

    let response = app.get("/health/ready").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["key_store"], "corrupt");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_token_counters() {
    let app = TestApp::new();
    app.register("alice").await;

    let response = app.get("/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("delta_tokens_issued_total"));
}
