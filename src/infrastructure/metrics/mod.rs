//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Wrapping key rotations and retirements
//! - Key store maintenance outcomes (rotated, idle, conflict, contended, failed)
//! - Retained wrapping key gauge
//! - Session tokens issued and verification outcomes

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Wrapping keys created
pub static KEY_ROTATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("key_rotations_total", "Total number of wrapping keys created")
            .namespace("delta"),
    )
    .expect("Failed to create KEY_ROTATIONS_TOTAL metric")
});

/// Wrapping keys deleted after retirement
pub static KEY_RETIREMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("key_retirements_total", "Total number of retired wrapping keys deleted")
            .namespace("delta"),
    )
    .expect("Failed to create KEY_RETIREMENTS_TOTAL metric")
});

/// Maintenance passes by outcome
pub static KEY_MAINTENANCE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("key_maintenance_total", "Key store maintenance passes by outcome")
            .namespace("delta"),
        &["outcome"],
    )
    .expect("Failed to create KEY_MAINTENANCE_TOTAL metric")
});

/// Wrapping keys currently retained
pub static RETAINED_KEYS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("retained_keys", "Number of wrapping keys currently retained").namespace("delta"),
    )
    .expect("Failed to create RETAINED_KEYS metric")
});

/// Session tokens issued
pub static TOKENS_ISSUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("tokens_issued_total", "Total number of session tokens issued").namespace("delta"),
    )
    .expect("Failed to create TOKENS_ISSUED_TOTAL metric")
});

/// Token verifications by outcome
pub static TOKEN_VERIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("token_verifications_total", "Session token verifications by outcome")
            .namespace("delta"),
        &["outcome"], // "ok", "malformed", "revoked", "expired", "error"
    )
    .expect("Failed to create TOKEN_VERIFICATIONS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(KEY_ROTATIONS_TOTAL.clone()))
        .expect("Failed to register KEY_ROTATIONS_TOTAL");
    registry
        .register(Box::new(KEY_RETIREMENTS_TOTAL.clone()))
        .expect("Failed to register KEY_RETIREMENTS_TOTAL");
    registry
        .register(Box::new(KEY_MAINTENANCE_TOTAL.clone()))
        .expect("Failed to register KEY_MAINTENANCE_TOTAL");
    registry
        .register(Box::new(RETAINED_KEYS.clone()))
        .expect("Failed to register RETAINED_KEYS");
    registry
        .register(Box::new(TOKENS_ISSUED_TOTAL.clone()))
        .expect("Failed to register TOKENS_ISSUED_TOTAL");
    registry
        .register(Box::new(TOKEN_VERIFICATIONS_TOTAL.clone()))
        .expect("Failed to register TOKEN_VERIFICATIONS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Helper to record a created wrapping key
pub fn record_key_rotation() {
    KEY_ROTATIONS_TOTAL.inc();
}

/// Helper to record deleted wrapping keys
pub fn record_key_retirements(count: usize) {
    KEY_RETIREMENTS_TOTAL.inc_by(count as u64);
}

/// Helper to record a maintenance pass
pub fn record_maintenance(outcome: &str) {
    KEY_MAINTENANCE_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to update the retained key gauge
pub fn set_retained_keys(count: usize) {
    RETAINED_KEYS.set(count as i64);
}

/// Helper to record an issued token
pub fn record_token_issued() {
    TOKENS_ISSUED_TOTAL.inc();
}

/// Helper to record a verification outcome
pub fn record_token_verification(outcome: &str) {
    TOKEN_VERIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}
