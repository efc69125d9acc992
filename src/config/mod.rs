//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use delta_server::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Rotating wrapping keys every {}h", settings.keystore.rotation_interval_hours);
//! ```

mod settings;

pub use settings::*;
