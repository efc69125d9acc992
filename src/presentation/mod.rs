//! Presentation Layer
//!
//! The seam between transports and the token authenticator, plus the
//! rotator's operational routes.

pub mod extractors;
pub mod routes;

pub use extractors::{authenticate_handshake, bearer_token, AuthUser};
pub use routes::{create_router, RouterState};
