//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration (rotation lock)
    pub redis: RedisSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Key rotation and retirement policy
    pub keystore: KeyStoreSettings,

    /// Session token settings
    pub session: SessionSettings,

    /// Account registration settings
    pub accounts: AccountSettings,

    /// Log output settings
    pub telemetry: TelemetrySettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

impl ServerSettings {
    /// Address to bind the operational endpoints to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL; without it rotation is only serialized in-process
    pub url: Option<String>,

    /// Key under which the rotation lease is stored
    pub lock_key: String,

    /// Lease lifetime in seconds
    pub lock_ttl_secs: u64,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Shard ID (0-31), zero for single-instance deployments
    pub shard_id: u8,
}

/// When rotation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Evaluated inside `current_data_key` on access
    Lazy,
    /// Evaluated only by the background scheduler
    Scheduled,
}

/// Key rotation and retirement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyStoreSettings {
    /// Rotate once the active wrapping key is older than this (hours)
    pub rotation_interval_hours: i64,

    /// Delete retired wrapping keys older than this (hours)
    pub retirement_age_hours: i64,

    pub rotation_mode: RotationMode,

    /// Scheduler tick in seconds
    pub check_interval_secs: u64,
}

/// Session token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Token lifetime in days
    pub token_lifetime_days: i64,
}

/// Account registration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSettings {
    /// Default handles are `{username}.{handle_domain}`
    pub handle_domain: String,
}

/// Log formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub format: LogFormat,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the key store thresholds are inconsistent.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Self::builder(&environment)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__KEYSTORE__ROTATION_MODE=scheduled -> keystore.rotation_mode = "scheduled"
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option(
                "snowflake.shard_id",
                std::env::var("SNOWFLAKE_SHARD_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    /// Builder pre-populated with every default.
    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9090)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("redis.lock_key", "delta:keystore:rotation")?
            .set_default("redis.lock_ttl_secs", 30)?
            .set_default("snowflake.shard_id", 0)?
            .set_default("keystore.rotation_interval_hours", 24)?
            .set_default("keystore.retirement_age_hours", 24 * 7)?
            .set_default("keystore.rotation_mode", "lazy")?
            .set_default("keystore.check_interval_secs", 60)?
            .set_default("session.token_lifetime_days", 365)?
            .set_default("accounts.handle_domain", "delta.noro.cc")?
            .set_default("telemetry.format", "pretty")?
            .set_default("telemetry.filter", "info,delta_server=debug,sqlx=warn")
    }

    /// Reject settings that would break key store invariants.
    fn validate(self) -> Result<Self, ConfigError> {
        let keystore = &self.keystore;
        if keystore.rotation_interval_hours <= 0 {
            return Err(ConfigError::Message(
                "keystore.rotation_interval_hours must be positive".into(),
            ));
        }
        if keystore.retirement_age_hours < keystore.rotation_interval_hours {
            return Err(ConfigError::Message(format!(
                "keystore.retirement_age_hours ({}) must be at least rotation_interval_hours ({})",
                keystore.retirement_age_hours, keystore.rotation_interval_hours
            )));
        }
        if keystore.check_interval_secs == 0 {
            return Err(ConfigError::Message(
                "keystore.check_interval_secs must be positive".into(),
            ));
        }
        if self.session.token_lifetime_days <= 0 {
            return Err(ConfigError::Message(
                "session.token_lifetime_days must be positive".into(),
            ));
        }
        if self.snowflake.shard_id > 31 {
            return Err(ConfigError::Message(format!(
                "snowflake.shard_id must be in 0..=31, got {}",
                self.snowflake.shard_id
            )));
        }
        Ok(self)
    }
}
