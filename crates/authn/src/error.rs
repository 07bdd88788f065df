//! Authentication error types.
//!
//! [`AuthError`] is the fixed taxonomy every session operation reports
//! through. Each variant maps to a stable wire code via
//! [`AuthError::code`]; callers never see anything finer-grained. In
//! particular an unknown refresh credential and an already-revoked one
//! are both [`AuthError::InvalidCredential`].

use std::time::Duration;

use taskhub_storage::{RetryableError, StorageError};
use thiserror::Error;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No usable identity: missing credential, unknown or inactive identity.
    #[error("Authentication required")]
    Unauthenticated,

    /// Credential signature is valid but it has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Credential is malformed, forged, of the wrong kind, unknown to the
    /// ledger, or already revoked.
    #[error("Invalid credential")]
    InvalidCredential,

    /// Authenticated but not allowed.
    #[error("Forbidden")]
    Forbidden,

    /// The addressed resource does not exist.
    #[error("Not found")]
    NotFound,

    /// Too many attempts in the current window.
    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the current window resets.
        retry_after: Duration,
    },

    /// A uniqueness invariant was violated.
    #[error("Conflict")]
    Conflict,

    /// The backing store is unreachable or timed out.
    #[error("Service unavailable")]
    Unavailable {
        /// The storage failure, when one caused this.
        #[source]
        source: Option<StorageError>,
    },

    /// Definitive storage failure (corrupt data, internal backend error).
    ///
    /// Wraps the original [`StorageError`] to preserve the source chain.
    #[error("Storage error: {0}")]
    Storage(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),

    /// Invalid configuration or key material.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Creates an `InvalidCredential` error, logging the concrete reason at
    /// debug level. The reason never reaches the caller.
    #[must_use]
    pub fn invalid_credential(reason: &str) -> Self {
        tracing::debug!(reason, "credential rejected");
        Self::InvalidCredential
    }

    /// Creates a `RateLimited` error.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Creates an `Unavailable` error without an underlying cause.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::Unavailable { source: None }
    }

    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Conflict => "CONFLICT",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::Storage(_) | Self::Configuration(_) => "INTERNAL",
        }
    }

    /// HTTP status the transport layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated | Self::TokenExpired | Self::InvalidCredential => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited { .. } => 429,
            Self::Unavailable { .. } => 503,
            Self::Storage(_) | Self::Configuration(_) => 500,
        }
    }

    /// Message safe to show to clients. Never includes internal detail.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Configuration(_) => "Internal error".to_owned(),
            Self::Unavailable { .. } => "Service unavailable".to_owned(),
            other => other.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::invalid_credential("signature mismatch"),
            ErrorKind::InvalidAlgorithm => AuthError::invalid_credential("algorithm not accepted"),
            ErrorKind::InvalidToken => AuthError::invalid_credential("malformed token"),
            _ => AuthError::invalid_credential("token rejected by decoder"),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            AuthError::Unavailable { source: Some(err) }
        } else if matches!(err, StorageError::Conflict) {
            AuthError::Conflict
        } else {
            AuthError::Storage(err)
        }
    }
}

impl RetryableError for AuthError {
    fn is_transient(&self) -> bool {
        matches!(self, AuthError::Unavailable { .. })
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
