//! API Tests
//!
//! Request-level tests driven through an axum `Router` with `oneshot`.

mod auth_tests;
mod health_tests;
