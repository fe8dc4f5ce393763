//! Credential persistence contract.
//!
//! The store is the only component that mutates users, refresh tokens and
//! password resets. Lookups return `Ok(None)` for "not found" so callers can
//! tell a missing row from a failing backend.
//!
//! Conditional updates carry the concurrency guarantees of the lifecycle:
//! [`CredentialStore::revoke_refresh_token`],
//! [`CredentialStore::mark_password_reset_used`] and
//! [`CredentialStore::complete_password_reset`] report whether *this* call
//! performed the transition. `complete_password_reset` applies all of its
//! writes or none of them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{PasswordResetRecord, RefreshTokenRecord, User, UserChanges};

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness guard rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn update_user_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Find a non-revoked refresh token that has not expired at `now`.
    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke a refresh token by lookup hash. Returns `true` only if the row
    /// was live (not revoked, not expired at `now`) and this call revoked it.
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Revoke every live refresh token of a user, returning how many were revoked.
    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn store_password_reset(&self, reset: &PasswordResetRecord) -> Result<(), StoreError>;

    /// Find a password reset by lookup hash, whatever its used/expiry state.
    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError>;

    /// Mark a password reset used. Returns `true` only if it was unused and
    /// this call consumed it.
    async fn mark_password_reset_used(&self, reset_id: &str) -> Result<bool, StoreError>;

    /// Consume a reset, set the owner's new password hash and revoke every
    /// live refresh token of the owner, as one unit. Returns `false`, with
    /// nothing written, when the reset was already used.
    async fn complete_password_reset(
        &self,
        reset_id: &str,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// One page of users ordered by creation time, plus the total count.
    async fn list_users(&self, limit: u32, offset: u32) -> Result<(Vec<User>, u64), StoreError>;

    /// Apply profile changes. `Ok(None)` when the user does not exist;
    /// [`StoreError::Conflict`] when the new email is taken.
    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError>;

    /// Delete a user with its refresh tokens and password resets. Returns
    /// `false` when the user does not exist.
    async fn delete_user(&self, user_id: &str) -> Result<bool, StoreError>;
}
