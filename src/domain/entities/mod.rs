//! Domain Entities
//!
//! Core entities of the credential subsystem and the repository traits
//! that define their persistence contracts.

pub mod encryption_key;
pub mod user;

pub use encryption_key::{
    wrap_aad, EncryptionKey, KeyRepository, LockLease, RotationLock, WrappedEntry, WrappedSecret,
};
pub use user::{User, UserRepository};

#[cfg(test)]
pub use user::MockUserRepository;
