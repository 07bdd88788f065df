//! Transport-facing helpers: cookies, rate-limit headers and error bodies.
//!
//! The HTTP layer itself lives elsewhere; these types render exactly what it
//! must put on the wire.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::AuthError, rate_limit::RateLimitDecision, session::IssuedSession};

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Sent only on same-site requests.
    Strict,
    /// Also sent on top-level cross-site navigations.
    Lax,
    /// Always sent; requires `Secure`.
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Names and attributes of the two session cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CookieConfig {
    /// Access-credential cookie name.
    pub access_name: String,
    /// Access-credential cookie path.
    pub access_path: String,
    /// Refresh-credential cookie name.
    pub refresh_name: String,
    /// Refresh-credential cookie path. Scoped to the auth routes so the
    /// refresh credential is not sent with every request.
    pub refresh_path: String,
    /// Emit the `Secure` attribute.
    pub secure: bool,
    /// `SameSite` attribute.
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_name: "access_token".to_owned(),
            access_path: "/".to_owned(),
            refresh_name: "refresh_token".to_owned(),
            refresh_path: "/auth".to_owned(),
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

/// One `Set-Cookie` header. Always `HttpOnly`.
#[derive(Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value; empty when clearing.
    pub value: String,
    /// `Path` attribute.
    pub path: String,
    /// `Max-Age` in seconds; `0` deletes the cookie.
    pub max_age: i64,
    /// `Secure` attribute.
    pub secure: bool,
    /// `SameSite` attribute.
    pub same_site: SameSite,
}

impl SetCookie {
    /// Renders the header value.
    ///
    /// ```
    /// use taskhub_authn::transport::{CookieConfig, clearing_cookies};
    ///
    /// let [access, _] = clearing_cookies(&CookieConfig::default());
    /// assert_eq!(
    ///     access.header_value(),
    ///     "access_token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax; Secure",
    /// );
    /// ```
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}",
            self.name, self.value, self.path, self.max_age, self.same_site
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

impl fmt::Debug for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetCookie")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn cookie(name: &str, value: &str, path: &str, max_age: i64, config: &CookieConfig) -> SetCookie {
    SetCookie {
        name: name.to_owned(),
        value: value.to_owned(),
        path: path.to_owned(),
        max_age,
        secure: config.secure,
        same_site: config.same_site,
    }
}

/// Cookies carrying a freshly issued session: `[access, refresh]`.
#[must_use]
pub fn session_cookies(session: &IssuedSession, config: &CookieConfig, now: DateTime<Utc>) -> [SetCookie; 2] {
    let max_age = |expires_at: DateTime<Utc>| (expires_at - now).num_seconds().max(0);
    [
        cookie(
            &config.access_name,
            &session.access.token,
            &config.access_path,
            max_age(session.access.expires_at),
            config,
        ),
        cookie(
            &config.refresh_name,
            &session.refresh.token,
            &config.refresh_path,
            max_age(session.refresh.expires_at),
            config,
        ),
    ]
}

/// Cookies deleting both session cookies: `[access, refresh]`.
#[must_use]
pub fn clearing_cookies(config: &CookieConfig) -> [SetCookie; 2] {
    [
        cookie(&config.access_name, "", &config.access_path, 0, config),
        cookie(&config.refresh_name, "", &config.refresh_path, 0, config),
    ]
}

/// `RateLimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `RateLimit-Limit`.
    pub limit: u64,
    /// `RateLimit-Remaining`.
    pub remaining: u64,
    /// `RateLimit-Reset`, seconds until the window resets.
    pub reset: u64,
    /// `RateLimit-Policy`, `"{limit};w={window_secs}"`.
    pub policy: String,
}

impl RateLimitHeaders {
    /// Builds the headers for a decision made under a `window`-long policy.
    #[must_use]
    pub fn from_decision(decision: &RateLimitDecision, window: Duration) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            // round partial seconds up so clients never retry early
            reset: decision.reset_after.as_millis().div_ceil(1000) as u64,
            policy: format!("{};w={}", decision.limit, window.as_secs()),
        }
    }

    /// Header name/value pairs.
    #[must_use]
    pub fn to_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("RateLimit-Limit", self.limit.to_string()),
            ("RateLimit-Remaining", self.remaining.to_string()),
            ("RateLimit-Reset", self.reset.to_string()),
            ("RateLimit-Policy", self.policy.clone()),
        ]
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: String,
    /// Client-safe message.
    pub message: String,
}

impl From<&AuthError> for ErrorBody {
    fn from(err: &AuthError) -> Self {
        Self { code: err.code().to_owned(), message: err.public_message() }
    }
}
