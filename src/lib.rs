//! # Delta Server Credential Core
//!
//! This crate provides the credential and session-security core of the
//! Delta chat server:
//! - Time-ordered, kind-tagged Snowflake identifiers
//! - Envelope encryption with rotating, retiring wrapping keys
//! - Opaque session tokens revoked by credential changes
//! - PostgreSQL persistence and an optional Redis rotation lock
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities, identifiers and repository traits
//! - **Application Layer**: Key lifecycle, token and account services
//! - **Infrastructure Layer**: Database, Redis and metrics implementations
//! - **Presentation Layer**: Bearer token extractor and handshake check
//!
//! ## Module Structure
//!
//! ```text
//! delta_server/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, and traits
//! +-- application/    Application services
//! +-- infrastructure/ Database, Redis and metrics implementations
//! +-- presentation/   Authentication extractors
//! +-- shared/         Common utilities (errors, crypto, clock, snowflake IDs)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - Authentication extractors
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
