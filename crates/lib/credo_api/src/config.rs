//! API server configuration.

use credo_core::auth::jwt::resolve_jwt_secret;
use credo_core::config::AuthPolicy;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3100";

/// Default PostgreSQL connection URL.
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/credo";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT signing secret, shared by the issuer and the bearer middleware.
    pub jwt_secret: String,
    /// Expiry windows, hashing cost and publish bound.
    pub policy: AuthPolicy,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                            |
    /// |------------------------------|------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3100`                   |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/credo`  |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file      |
    ///
    /// Policy variables are documented on [`AuthPolicy::from_env`].
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            jwt_secret: resolve_jwt_secret(),
            policy: AuthPolicy::from_env(),
        }
    }
}
