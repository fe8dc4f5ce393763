//! Credential lifecycle controller.
//!
//! Sequences registration, login, refresh rotation, logout and password
//! recovery over the injected collaborators. Holds no durable state; every
//! invariant that spans concurrent requests is delegated to the store's
//! conditional updates.
//!
//! Refresh and reset tokens move one way only:
//! `issued → valid → {rotated | revoked | expired | used}`.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::jwt::{JwtTokenIssuer, TokenIssuing};
use super::password::{BcryptHasher, PasswordHashing};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthPolicy;
use crate::events::{AuthEvents, EventPublisher, ForgotPasswordEvent};
use crate::ids::new_id;
use crate::models::auth::{
    AuthTokens, PasswordResetRecord, RefreshTokenRecord, RegisterInput, ResetPasswordInput, User,
};
use crate::models::role::Role;
use crate::store::{CredentialStore, StoreError};

/// Verified against when the email is unknown, so both login failures
/// cost one bcrypt verification.
const DUMMY_PASSWORD: &str = "credo-login-timing-equaliser";

/// Orchestrates the six lifecycle operations. Cheap to share behind `Arc`.
pub struct AuthLifecycle {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHashing>,
    tokens: Arc<dyn TokenIssuing>,
    events: AuthEvents,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
    dummy_hash: OnceLock<String>,
}

impl AuthLifecycle {
    /// Build a controller from every collaborator it needs.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHashing>,
        tokens: Arc<dyn TokenIssuing>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        let events = AuthEvents::new(publisher, policy.publish_timeout);
        Self {
            store,
            hasher,
            tokens,
            events,
            clock,
            policy,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Standard wiring: bcrypt at the policy's cost, HS256 access tokens,
    /// wall-clock time.
    pub fn with_defaults(
        store: Arc<dyn CredentialStore>,
        publisher: Arc<dyn EventPublisher>,
        jwt_secret: &[u8],
        policy: AuthPolicy,
    ) -> Self {
        let hasher = Arc::new(BcryptHasher::new(policy.bcrypt_cost));
        let tokens = Arc::new(JwtTokenIssuer::new(jwt_secret, policy.access_token_ttl));
        Self::new(store, hasher, tokens, publisher, Arc::new(SystemClock), policy)
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    /// Create an account with the default role. Issues no tokens.
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthError> {
        if self.store.find_user_by_email(&input.email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        if input.password != input.password_confirmation {
            return Err(AuthError::PasswordMismatch);
        }

        let password_hash = self.hasher.hash(&input.password)?;
        let now = self.clock.now();
        let user = User {
            id: new_id(),
            name: input.name,
            email: input.email,
            password_hash,
            role_id: Role::default().id().to_string(),
            created_at: now,
            updated_at: now,
        };

        // The existence check above can race; the store's uniqueness guard cannot.
        match self.store.create_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(AuthError::AlreadyExists),
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Exchange email + password for an access token and a refresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            self.verify_dummy(password);
            debug!("login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            debug!(user_id = %user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            self.rehash(&user, password).await;
        }

        let tokens = self.issue_session(&user, self.clock.now()).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(tokens)
    }

    /// Rotate a refresh token: the presented token is revoked before its
    /// replacement is issued, so it can be redeemed at most once.
    pub async fn refresh_token(&self, presented: &str) -> Result<AuthTokens, AuthError> {
        let token_hash = self.hasher.lookup_hash(presented);
        let now = self.clock.now();

        let record = self
            .store
            .find_valid_refresh_token(&token_hash, now)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !self.store.revoke_refresh_token(&token_hash, now).await? {
            warn!(
                user_id = %record.user_id,
                "refresh token redeemed concurrently; rejecting second use"
            );
            return Err(AuthError::InvalidToken);
        }

        let Some(user) = self.store.find_user_by_id(&record.user_id).await? else {
            warn!(user_id = %record.user_id, "refresh token owner no longer exists");
            return Err(AuthError::InvalidToken);
        };

        let tokens = self.issue_session(&user, now).await?;
        debug!(user_id = %user.id, "refresh token rotated");
        Ok(tokens)
    }

    /// Revoke a refresh token.
    pub async fn logout(&self, presented: &str) -> Result<(), AuthError> {
        let token_hash = self.hasher.lookup_hash(presented);
        let now = self.clock.now();

        let record = self
            .store
            .find_valid_refresh_token(&token_hash, now)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !self.store.revoke_refresh_token(&token_hash, now).await? {
            return Err(AuthError::InvalidToken);
        }

        info!(user_id = %record.user_id, "user logged out");
        Ok(())
    }

    /// Start password recovery.
    ///
    /// Fails with [`AuthError::UserNotFound`] for unknown emails. Callers must
    /// answer that case exactly like success so the response does not reveal
    /// which emails are registered.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("password reset requested for unknown email");
            return Err(AuthError::UserNotFound);
        };

        let token = self.hasher.random_token();
        let now = self.clock.now();
        let expires_at = now + self.policy.reset_token_ttl;
        let reset = PasswordResetRecord {
            id: new_id(),
            user_id: user.id.clone(),
            token_hash: self.hasher.lookup_hash(&token),
            used: false,
            expires_at,
            created_at: now,
            updated_at: now,
        };
        self.store.store_password_reset(&reset).await?;

        let event = ForgotPasswordEvent {
            email: user.email,
            token,
            expires_at,
        };
        // The reset row is already committed; a lost notification is logged
        // and counted, never returned.
        if let Err(e) = self.events.forgot_password(&event).await {
            self.events.record_failure();
            warn!(
                user_id = %user.id,
                reset_id = %reset.id,
                error = %e,
                "forgot-password notification not delivered"
            );
        }

        info!(user_id = %user.id, reset_id = %reset.id, "password reset requested");
        Ok(())
    }

    /// Consume a reset token and set a new password. Every refresh token of
    /// the user is revoked, forcing re-authentication everywhere. The store
    /// applies consume, password change and revocation as one unit, so a
    /// failed attempt leaves the token usable.
    pub async fn reset_password(&self, input: ResetPasswordInput) -> Result<(), AuthError> {
        let token_hash = self.hasher.lookup_hash(&input.token);

        let reset = self
            .store
            .find_password_reset(&token_hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // Expiry is checked before the used flag.
        if self.clock.now() > reset.expires_at {
            return Err(AuthError::ResetExpired);
        }
        if reset.used {
            return Err(AuthError::ResetAlreadyUsed);
        }

        let user = self
            .store
            .find_user_by_id(&reset.user_id)
            .await?
            .ok_or_else(|| {
                warn!(reset_id = %reset.id, user_id = %reset.user_id, "reset owner missing");
                AuthError::UserNotFound
            })?;

        let password_hash = self.hasher.hash(&input.new_password)?;

        if !self
            .store
            .complete_password_reset(&reset.id, &user.id, &password_hash)
            .await?
        {
            return Err(AuthError::ResetAlreadyUsed);
        }

        info!(user_id = %user.id, reset_id = %reset.id, "password reset completed");
        Ok(())
    }

    /// Load a user by id, for authenticated profile lookups.
    pub async fn find_user(&self, user_id: &str) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Mint an access token and a persisted refresh token for `user`.
    async fn issue_session(&self, user: &User, now: DateTime<Utc>) -> Result<AuthTokens, AuthError> {
        let access_token = self
            .tokens
            .issue_access_token(&user.id, &user.role_id, now)?;
        let refresh = self.tokens.issue_refresh_token();

        let record = RefreshTokenRecord {
            id: new_id(),
            user_id: user.id.clone(),
            token_hash: refresh.lookup_hash,
            revoked: false,
            expires_at: now + self.policy.refresh_token_ttl,
            created_at: now,
            updated_at: now,
        };
        self.store.store_refresh_token(&record).await?;

        Ok(AuthTokens {
            access_token,
            refresh_token: refresh.plaintext,
            expires_in: self.tokens.access_token_ttl().num_seconds(),
        })
    }

    /// Upgrade a hash written with weaker parameters. Failure only costs the upgrade.
    async fn rehash(&self, user: &User, password: &str) {
        let result = match self.hasher.hash(password) {
            Ok(hash) => self
                .store
                .update_user_password(&user.id, &hash)
                .await
                .map_err(AuthError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(user_id = %user.id, "password hash upgraded"),
            Err(e) => warn!(user_id = %user.id, error = %e, "password rehash failed"),
        }
    }

    fn verify_dummy(&self, password: &str) {
        let hash = self
            .dummy_hash
            .get_or_init(|| self.hasher.hash(DUMMY_PASSWORD).unwrap_or_default());
        if !hash.is_empty() {
            let _ = self.hasher.verify(password, hash);
        }
    }
}
