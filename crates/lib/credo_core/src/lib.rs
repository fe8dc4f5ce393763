//! # credo_core
//!
//! Credential lifecycle domain logic for Credo: password hashing, token
//! issuance, persistence contracts, and the controller that sequences
//! registration, login, refresh rotation, logout and password recovery.

pub mod auth;
pub mod clock;
pub mod config;
pub mod events;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod store;
pub mod users;

pub use auth::AuthError;
pub use auth::lifecycle::AuthLifecycle;
pub use users::UserDirectory;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
