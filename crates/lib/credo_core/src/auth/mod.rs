//! Authentication and credential lifecycle.
//!
//! Provides password hashing, token issuance and the lifecycle controller
//! that can be shared across transports.

pub mod jwt;
pub mod lifecycle;
pub mod password;


use thiserror::Error;

use crate::store::StoreError;

/// Classified lifecycle failures.
///
/// `UserNotFound` from [`lifecycle::AuthLifecycle::forgot_password`] is an
/// internal signal: callers must answer exactly as on success.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    AlreadyExists,

    #[error("Password confirmation does not match")]
    PasswordMismatch,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Password reset token expired")]
    ResetExpired,

    #[error("Password reset token already used")]
    ResetAlreadyUsed,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
