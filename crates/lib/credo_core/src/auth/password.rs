//! Password hashing via bcrypt, plus opaque-token helpers.
//!
//! Passwords use bcrypt (slow, salted). Opaque tokens use SHA-256: lookup
//! hashes must be deterministic so the store can match on them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::AuthError;

/// Bytes of entropy in every opaque token.
pub const TOKEN_BYTES: usize = 32;

/// Capability used by the lifecycle controller for all hashing needs.
pub trait PasswordHashing: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;

    /// `false` for a wrong password and for an unreadable hash.
    fn verify(&self, password: &str, hash: &str) -> bool;

    /// Whether `hash` was produced with weaker parameters than the current ones.
    fn needs_rehash(&self, hash: &str) -> bool;

    fn random_token(&self) -> String;

    fn lookup_hash(&self, token: &str) -> String;
}

/// bcrypt password hasher. The cost is embedded in every hash it writes,
/// so raising it keeps older hashes verifiable.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHashing for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "stored password hash is unreadable");
                false
            }
        }
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        bcrypt_cost(hash).is_none_or(|cost| cost < self.cost)
    }

    fn random_token(&self) -> String {
        random_token()
    }

    fn lookup_hash(&self, token: &str) -> String {
        lookup_hash(token)
    }
}

/// Cost field of a modular-crypt bcrypt hash (`$2b$10$...`).
fn bcrypt_cost(hash: &str) -> Option<u32> {
    let mut parts = hash.split('$');
    parts.next()?;
    let _variant = parts.next()?;
    parts.next()?.parse().ok()
}

/// Generate a random opaque token: 32 bytes from the thread CSPRNG, base64url.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash a token for storage and lookup.
pub fn lookup_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
