//! In-process [`CredentialStore`] backed by `DashMap`.
//!
//! Used by tests and local runs without a database. Each conditional
//! transition happens under a single shard lock, which gives the same
//! at-most-once guarantees as the conditional `UPDATE`s of the Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{CredentialStore, StoreError};
use crate::models::auth::{PasswordResetRecord, RefreshTokenRecord, User, UserChanges};

#[derive(Default)]
pub struct MemoryCredentialStore {
    /// Users by id.
    users: DashMap<String, User>,
    /// Email → user id; the uniqueness guard.
    emails: DashMap<String, String>,
    /// Refresh tokens by lookup hash.
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    /// Password resets by id.
    password_resets: DashMap<String, PasswordResetRecord>,
    /// Reset lookup hash → reset id.
    reset_hashes: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All refresh token rows of a user, live or not.
    pub fn refresh_tokens_for(&self, user_id: &str) -> Vec<RefreshTokenRecord> {
        self.refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect()
    }

    /// All password reset rows of a user.
    pub fn password_resets_for(&self, user_id: &str) -> Vec<PasswordResetRecord> {
        self.password_resets
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn password_reset_count(&self) -> usize {
        self.password_resets.len()
    }

    fn revoke_all_for(&self, user_id: &str, now: DateTime<Utc>) -> u64 {
        let mut revoked = 0;
        for mut token in self.refresh_tokens.iter_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                token.updated_at = now;
                revoked += 1;
            }
        }
        revoked
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("email already registered".into())),
            Entry::Vacant(slot) => {
                self.users.insert(user.id.clone(), user.clone());
                slot.insert(user.id.clone());
                Ok(())
            }
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(user_id) = self.emails.get(email).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn update_user_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<(), StoreError> {
        match self.refresh_tokens.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("refresh token hash exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self
            .refresh_tokens
            .get(token_hash)
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.value().clone()))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut token) = self.refresh_tokens.get_mut(token_hash) else {
            return Ok(false);
        };
        if !token.is_valid_at(now) {
            return Ok(false);
        }
        token.revoked = true;
        token.updated_at = now;
        Ok(true)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self.revoke_all_for(user_id, Utc::now()))
    }

    async fn store_password_reset(&self, reset: &PasswordResetRecord) -> Result<(), StoreError> {
        match self.reset_hashes.entry(reset.token_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("reset token hash exists".into())),
            Entry::Vacant(slot) => {
                self.password_resets.insert(reset.id.clone(), reset.clone());
                slot.insert(reset.id.clone());
                Ok(())
            }
        }
    }

    async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError> {
        let Some(reset_id) = self.reset_hashes.get(token_hash).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.password_resets.get(&reset_id).map(|r| r.value().clone()))
    }

    async fn mark_password_reset_used(&self, reset_id: &str) -> Result<bool, StoreError> {
        let Some(mut reset) = self.password_resets.get_mut(reset_id) else {
            return Ok(false);
        };
        if reset.used {
            return Ok(false);
        }
        reset.used = true;
        reset.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_password_reset(
        &self,
        reset_id: &str,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        // The reset row stays locked until every write is done.
        let Some(mut reset) = self.password_resets.get_mut(reset_id) else {
            return Ok(false);
        };
        if reset.used {
            return Ok(false);
        }
        let now = Utc::now();
        {
            let Some(mut user) = self.users.get_mut(user_id) else {
                return Err(StoreError::Backend(format!(
                    "password reset {reset_id} owner {user_id} missing"
                )));
            };
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }
        self.revoke_all_for(user_id, now);
        reset.used = true;
        reset.updated_at = now;
        Ok(true)
    }

    async fn list_users(&self, limit: u32, offset: u32) -> Result<(Vec<User>, u64), StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let total = users.len() as u64;
        let page = users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let Some(current_email) = self.users.get(user_id).map(|u| u.email.clone()) else {
            return Ok(None);
        };

        // Claim the new email before touching the user so a taken address
        // leaves the row unchanged.
        if let Some(email) = &changes.email
            && *email != current_email
        {
            match self.emails.entry(email.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::Conflict("email already registered".into()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(user_id.to_string());
                }
            }
            self.emails.remove(&current_email);
        }

        let Some(mut user) = self.users.get_mut(user_id) else {
            return Ok(None);
        };
        changes.apply(user.value_mut(), Utc::now());
        Ok(Some(user.value().clone()))
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool, StoreError> {
        let Some((_, user)) = self.users.remove(user_id) else {
            return Ok(false);
        };
        self.emails.remove(&user.email);
        self.refresh_tokens.retain(|_, t| t.user_id != user_id);
        self.password_resets.retain(|_, r| r.user_id != user_id);
        self.reset_hashes
            .retain(|_, reset_id| self.password_resets.contains_key(reset_id));
        Ok(true)
    }
}
