//! Value Objects
//!
//! Immutable value types with no identity of their own.

pub mod snowflake;

pub use snowflake::{
    timestamp_of, EntityKind, IdentifierError, Snowflake, DELTA_EPOCH, MAX_TIMESTAMP,
};
