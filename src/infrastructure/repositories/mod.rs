//! Repository Implementations
//!
//! Concrete implementations of the repository traits defined in the domain
//! layer.
//!
//! ## Available Repositories
//!
//! - **PgKeyRepository** - Wrapping keys and the wrapped data key (PostgreSQL)
//! - **PgUserRepository** - User accounts (PostgreSQL)
//! - **InMemoryKeyRepository** / **InMemoryUserRepository** - Process-local
//!   stores for single-node setups and tests
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use delta_server::infrastructure::repositories::{PgKeyRepository, PgUserRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let key_repo = PgKeyRepository::new(pool.clone());
//!     let user_repo = PgUserRepository::new(pool);
//! }
//! ```

pub mod key_repository;
pub mod memory;
pub mod user_repository;

pub use key_repository::PgKeyRepository;
pub use memory::{InMemoryKeyRepository, InMemoryUserRepository};
pub use user_repository::PgUserRepository;
