//! Lifecycle policy: expiry windows, hashing cost and publish bound.

use std::ops::RangeInclusive;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::warn;

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Password reset token lifetime: 15 minutes.
pub const DEFAULT_RESET_TOKEN_TTL_SECS: i64 = 15 * 60;

/// bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Costs bcrypt accepts.
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;

/// Accepted token lifetimes, in seconds: one second up to ten years.
pub const TTL_SECS_RANGE: RangeInclusive<i64> = 1..=10 * 365 * 24 * 60 * 60;

/// Accepted publish bounds, in milliseconds.
pub const PUBLISH_TIMEOUT_MS_RANGE: RangeInclusive<u64> = 1..=60_000;

/// Upper bound on a single notification publish attempt.
pub const DEFAULT_PUBLISH_TIMEOUT: StdDuration = StdDuration::from_secs(2);

/// Policy knobs owned by the lifecycle controller.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub publish_timeout: StdDuration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            reset_token_ttl: Duration::seconds(DEFAULT_RESET_TOKEN_TTL_SECS),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl AuthPolicy {
    /// Reads the policy from environment variables, falling back to defaults.
    /// Unparsable or out-of-range values are logged and ignored.
    ///
    /// | Variable                 | Default  |
    /// |--------------------------|----------|
    /// | `ACCESS_TOKEN_TTL_SECS`  | `900`    |
    /// | `REFRESH_TOKEN_TTL_SECS` | `604800` |
    /// | `RESET_TOKEN_TTL_SECS`   | `900`    |
    /// | `BCRYPT_COST`            | `10`     |
    /// | `PUBLISH_TIMEOUT_MS`     | `2000`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_token_ttl: env_in_range("ACCESS_TOKEN_TTL_SECS", &TTL_SECS_RANGE)
                .map(Duration::seconds)
                .unwrap_or(defaults.access_token_ttl),
            refresh_token_ttl: env_in_range("REFRESH_TOKEN_TTL_SECS", &TTL_SECS_RANGE)
                .map(Duration::seconds)
                .unwrap_or(defaults.refresh_token_ttl),
            reset_token_ttl: env_in_range("RESET_TOKEN_TTL_SECS", &TTL_SECS_RANGE)
                .map(Duration::seconds)
                .unwrap_or(defaults.reset_token_ttl),
            bcrypt_cost: env_in_range("BCRYPT_COST", &BCRYPT_COST_RANGE)
                .unwrap_or(defaults.bcrypt_cost),
            publish_timeout: env_in_range("PUBLISH_TIMEOUT_MS", &PUBLISH_TIMEOUT_MS_RANGE)
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.publish_timeout),
        }
    }
}

/// Parse an environment variable, warning (and ignoring it) when malformed.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

fn env_in_range<T>(key: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    within(key, env_parse(key)?, range)
}

/// `Some(value)` if it lies in `range`; otherwise warn and return `None`.
fn within<T>(key: &str, value: T, range: &RangeInclusive<T>) -> Option<T>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Some(value)
    } else {
        warn!(
            key,
            value = %value,
            min = %range.start(),
            max = %range.end(),
            "ignoring out-of-range setting"
        );
        None
    }
}
