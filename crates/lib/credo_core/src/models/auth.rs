//! Authentication domain models.
//!
//! These are internal domain models, distinct from the wire models of the
//! HTTP boundary (which are camelCase and never carry hashes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain user, including the stored password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Unique, compared case-sensitively as stored.
    pub email: String,
    pub password_hash: String,
    /// Role identifier; see [`crate::models::role::Role::from_id`].
    pub role_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refresh grant record. `token_hash` is the lookup hash, never the plaintext.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Not revoked and not yet expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// One-time credential recovery grant.
#[derive(Debug, Clone)]
pub struct PasswordResetRecord {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Role identifier of the subject.
    pub role: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Freshly minted refresh token: the plaintext goes to the caller once,
/// only `lookup_hash` is persisted.
#[derive(Clone)]
pub struct RefreshTokenPair {
    pub plaintext: String,
    pub lookup_hash: String,
}

impl std::fmt::Debug for RefreshTokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenPair")
            .field("plaintext", &"<redacted>")
            .field("lookup_hash", &self.lookup_hash)
            .finish()
    }
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Input for [`crate::AuthLifecycle::register`].
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Input for [`crate::AuthLifecycle::reset_password`].
#[derive(Debug, Clone)]
pub struct ResetPasswordInput {
    pub token: String,
    pub new_password: String,
}

/// Partial profile update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.role_id.is_none()
    }

    /// Apply the changes to `user`, stamping `updated_at`.
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name.clone_from(name);
        }
        if let Some(email) = &self.email {
            user.email.clone_from(email);
        }
        if let Some(role_id) = &self.role_id {
            user.role_id.clone_from(role_id);
        }
        user.updated_at = now;
    }
}
