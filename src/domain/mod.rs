//! # Domain Layer
//!
//! The domain layer contains the core types of the credential subsystem.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Users, wrapping keys, the wrapped data key, and the
//!   repository traits that persist them
//! - **value_objects**: Immutable value types (kind-tagged Snowflake IDs)
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Repository traits define data access contracts

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
