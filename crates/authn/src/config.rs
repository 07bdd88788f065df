//! Session-core configuration.
//!
//! All structs deserialize with `humantime` durations and reject unknown
//! fields. Missing fields take the documented defaults.
//!
//! ```
//! use std::time::Duration;
//! use taskhub_authn::AuthConfig;
//!
//! let config: AuthConfig = serde_json::from_str(
//!     r#"{"issuer": "https://api.taskhub.dev", "access_ttl": "5m"}"#,
//! ).unwrap();
//! assert_eq!(config.access_ttl, Duration::from_secs(300));
//! assert_eq!(config.refresh_ttl, Duration::from_secs(14 * 24 * 3600));
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskhub_storage::RetryConfig;

use crate::{error::AuthError, rate_limit::RateLimitAction, transport::CookieConfig};

/// Top-level configuration of the session core.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// `iss` claim written to and required on every credential.
    #[serde(default = "default_issuer")]
    #[builder(into, default = default_issuer())]
    pub issuer: String,

    /// Lifetime of access credentials.
    #[serde(with = "humantime_serde", default = "default_access_ttl")]
    #[builder(default = default_access_ttl())]
    pub access_ttl: Duration,

    /// Lifetime of refresh credentials and their ledger records.
    #[serde(with = "humantime_serde", default = "default_refresh_ttl")]
    #[builder(default = default_refresh_ttl())]
    pub refresh_ttl: Duration,

    /// Upper bound on one ledger operation, including lock waits and
    /// retries.
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    #[builder(default = default_store_timeout())]
    pub store_timeout: Duration,

    /// Retry policy for transient ledger failures.
    #[serde(default)]
    #[builder(default)]
    pub retry: RetryConfig,

    /// Per-action rate-limit policies.
    #[serde(default)]
    #[builder(default)]
    pub rate_limits: RateLimitConfig,

    /// Session cookie attributes.
    #[serde(default)]
    #[builder(default)]
    pub cookies: CookieConfig,
}

/// Longest lifetime a credential may be issued with (ten years).
pub const MAX_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

fn default_issuer() -> String {
    "taskhub".to_owned()
}

fn default_access_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_refresh_ttl() -> Duration {
    Duration::from_secs(14 * 24 * 3600)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuthConfig {
    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.issuer.trim().is_empty() {
            return Err(AuthError::configuration("issuer must not be empty"));
        }
        if self.access_ttl.is_zero() || self.refresh_ttl.is_zero() {
            return Err(AuthError::configuration("credential lifetimes must be non-zero"));
        }
        if self.refresh_ttl > MAX_CREDENTIAL_LIFETIME {
            return Err(AuthError::configuration("refresh_ttl exceeds the maximum credential lifetime"));
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(AuthError::configuration("access_ttl must be shorter than refresh_ttl"));
        }
        if self.store_timeout.is_zero() {
            return Err(AuthError::configuration("store_timeout must be non-zero"));
        }
        for action in RateLimitAction::ALL {
            let policy = self.rate_limits.policy(action);
            if policy.max_count == 0 || policy.window.is_zero() {
                return Err(AuthError::configuration(format!(
                    "rate limit for {action} must allow at least one attempt per non-empty window"
                )));
            }
        }
        Ok(())
    }
}

/// At most `max_count` actions per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitPolicy {
    /// Actions allowed per window.
    pub max_count: u64,
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_count: u64, window: Duration) -> Self {
        Self { max_count, window }
    }
}

/// Policies for each [`RateLimitAction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Password or magic-link sign-in attempts per principal.
    #[serde(default = "default_sign_in")]
    pub sign_in: RateLimitPolicy,
    /// Refresh rotations per principal.
    #[serde(default = "default_rotate")]
    pub rotate: RateLimitPolicy,
    /// Social-provider exchanges per principal.
    #[serde(default = "default_social_exchange")]
    pub social_exchange: RateLimitPolicy,
}

fn default_sign_in() -> RateLimitPolicy {
    RateLimitPolicy::new(5, Duration::from_secs(60))
}

fn default_rotate() -> RateLimitPolicy {
    RateLimitPolicy::new(30, Duration::from_secs(60))
}

fn default_social_exchange() -> RateLimitPolicy {
    RateLimitPolicy::new(10, Duration::from_secs(60))
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sign_in: default_sign_in(),
            rotate: default_rotate(),
            social_exchange: default_social_exchange(),
        }
    }
}

impl RateLimitConfig {
    /// Policy for `action`.
    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::SignIn => self.sign_in,
            RateLimitAction::Rotate => self.rotate,
            RateLimitAction::SocialExchange => self.social_exchange,
        }
    }
}
