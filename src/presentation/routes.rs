//! Route Configuration
//!
//! Operational endpoints of the key rotator process.
//!
//! # Endpoints
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe (can the data key be read?)
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/users/@me` - Subject behind a bearer token

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::extractors::AuthUser;
use crate::application::services::{AuthService, KeyLifecycleManager, KeyStoreError};
use crate::domain::{KeyRepository, User};
use crate::infrastructure::metrics;

/// State shared by the operational routes
pub struct RouterState<R: KeyRepository> {
    pub auth: Arc<dyn AuthService>,
    pub keys: Arc<KeyLifecycleManager<R>>,
}

impl<R: KeyRepository> Clone for RouterState<R> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<R: KeyRepository> FromRef<RouterState<R>> for Arc<dyn AuthService> {
    fn from_ref(state: &RouterState<R>) -> Self {
        state.auth.clone()
    }
}

/// Simple liveness response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub key_store: &'static str,
}

/// Create the router
pub fn create_router<R>(auth: Arc<dyn AuthService>, keys: Arc<KeyLifecycleManager<R>>) -> Router
where
    R: KeyRepository + 'static,
{
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness::<R>))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/users/@me", get(current_user))
        .with_state(RouterState { auth, keys })
}

/// Liveness probe
async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - 503 while the data key cannot be read
async fn readiness<R>(State(state): State<RouterState<R>>) -> impl IntoResponse
where
    R: KeyRepository + 'static,
{
    let (status_code, key_store) = match state.keys.fetch_data_key().await {
        Ok(Some(_)) => (StatusCode::OK, "ok"),
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, "uninitialized"),
        Err(KeyStoreError::Unavailable(e)) => {
            tracing::warn!(error = %e, "Key store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
        Err(e) => {
            tracing::error!(error = %e, "Key store unusable");
            (StatusCode::SERVICE_UNAVAILABLE, "corrupt")
        }
    };

    let status = if status_code == StatusCode::OK {
        "ready"
    } else {
        "not_ready"
    };

    (status_code, Json(ReadinessResponse { status, key_store }))
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

async fn current_user(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
