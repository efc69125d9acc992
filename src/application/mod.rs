//! Application Layer
//!
//! Contains the services that drive key lifecycle, session tokens and
//! accounts. This layer orchestrates the flow of data between the
//! presentation and domain layers.

pub mod services;
