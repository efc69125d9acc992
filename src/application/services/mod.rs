//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **KeyLifecycleManager**: Wrapping key rotation, retirement and the data key
//! - **AuthService**: Session token issuance and verification
//! - **AccountService**: Registration, login and password changes
//! - **RotationScheduler**: Periodic key maintenance

pub mod account_service;
pub mod auth_service;
pub mod key_lifecycle;
pub mod rotation_scheduler;

pub use account_service::{
    AccountError, AccountService, AccountServiceImpl, LoginRequest, RegisterRequest,
};
pub use auth_service::{
    decode_token, encode_token, AuthError, AuthService, SessionTokenPayload, TokenAuthenticator,
    TOKEN_PREFIX,
};
pub use key_lifecycle::{
    DataKey, KeyLifecycleManager, KeyPolicy, KeyStoreError, MaintenanceOutcome, RotationPlan,
};
pub use rotation_scheduler::RotationScheduler;
