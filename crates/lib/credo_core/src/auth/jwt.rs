//! Access and refresh token issuance.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

use super::AuthError;
use super::password::{lookup_hash, random_token};
use crate::models::auth::{RefreshTokenPair, TokenClaims};

/// Capability used by the lifecycle controller to mint credentials.
pub trait TokenIssuing: Send + Sync {
    /// Signed access token for `user_id` carrying `role_id`, valid from `issued_at`.
    fn issue_access_token(
        &self,
        user_id: &str,
        role_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError>;

    /// Opaque refresh token and its lookup hash.
    fn issue_refresh_token(&self) -> RefreshTokenPair;

    fn access_token_ttl(&self) -> Duration;
}

/// HS256 JWT access tokens with a shared symmetric secret.
pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    access_token_ttl: Duration,
}

impl JwtTokenIssuer {
    pub fn new(secret: &[u8], access_token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            access_token_ttl,
        }
    }
}

impl TokenIssuing for JwtTokenIssuer {
    fn issue_access_token(
        &self,
        user_id: &str,
        role_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims {
            sub: user_id.to_string(),
            role: role_id.to_string(),
            exp: (issued_at + self.access_token_ttl).timestamp(),
            iat: issued_at.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    fn issue_refresh_token(&self) -> RefreshTokenPair {
        let plaintext = random_token();
        let lookup_hash = lookup_hash(&plaintext);
        RefreshTokenPair {
            plaintext,
            lookup_hash,
        }
    }

    fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }
}

/// Verify a JWT access token, returning the claims on success.
///
/// Used by request-authentication middleware; the lifecycle controller never
/// verifies access tokens itself.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<TokenClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);
    decode::<TokenClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    for key in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Ok(secret) = std::env::var(key)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    load_or_create_secret(&jwt_secret_path())
}

/// Read the secret stored at `path`, generating and persisting one if absent.
pub fn load_or_create_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, &secret);
    info!(path = %path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credo")
        .join("jwt-secret")
}
