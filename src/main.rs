//! # Delta Key Rotator
//!
//! Dedicated process that owns key maintenance for a deployment.
//!
//! This is the application entry point that initializes:
//! - Configuration loading
//! - Tracing/logging subsystem
//! - Database connection pool and migrations
//! - Optional Redis rotation lock
//! - The key store (bootstrapped on first start) and rotation scheduler

use anyhow::Result;
use tracing::info;

use delta_server::config::Settings;
use delta_server::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment and config files
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    delta_server::telemetry::init_tracing(&settings.telemetry);

    info!(
        environment = %settings.environment,
        rotation_mode = ?settings.keystore.rotation_mode,
        rotation_interval_hours = settings.keystore.rotation_interval_hours,
        retirement_age_hours = settings.keystore.retirement_age_hours,
        shard_id = settings.snowflake.shard_id,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Key rotator running");
    application.run_until_stopped().await?;

    Ok(())
}
