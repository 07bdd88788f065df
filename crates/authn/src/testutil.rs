//! Shared test utilities for session testing.
//!
//! Provides a manually driven clock, a fully wired [`TestHarness`], helpers
//! for crafting hostile credentials, and the [`assert_auth_error!`] macro.
//! Feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! taskhub-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use taskhub_authn::testutil::{ManualClock, TestHarness, craft_raw_jwt};
//! ```

use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, Header};
use parking_lot::Mutex;
use taskhub_storage::{MemoryBackend, StorageBackend, SubjectId, ledger::RevocationLedger};

use crate::{
    clock::Clock,
    codec::{CredentialCodec, CredentialKind},
    config::AuthConfig,
    identity::{Identity, InMemoryIdentityStore, Role},
    keys::SigningSecrets,
    session::SessionService,
};

/// A [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if `by` does not fit a calendar duration.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += TimeDelta::from_std(by).expect("duration in range");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Creates a raw JWT from arbitrary header and payload JSON, with an empty
/// signature. For `alg: none` and other malformed-token tests.
///
/// # Panics
///
/// Panics if JSON serialization fails.
#[allow(clippy::expect_used)]
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Signs arbitrary claims with the real key of `kind`, so tests can produce
/// authentic credentials with hostile content (future `iat`, foreign
/// issuer, swapped `typ`).
///
/// # Panics
///
/// Panics if signing fails.
#[allow(clippy::expect_used)]
pub fn sign_claims(secrets: &SigningSecrets, kind: CredentialKind, claims: &serde_json::Value) -> String {
    let pair = secrets.for_kind(kind);
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(pair.kid().to_owned());
    jsonwebtoken::encode(&header, claims, pair.encoding_key()).expect("sign test claims")
}

/// A [`SessionService`] wired to in-memory collaborators and a
/// [`ManualClock`], with one active member and one active admin.
pub struct TestHarness<B = MemoryBackend> {
    /// Ledger backend.
    pub backend: Arc<B>,
    /// Clock driving credential and ledger time.
    pub clock: Arc<ManualClock>,
    /// Signing secrets used by the service.
    pub secrets: Arc<SigningSecrets>,
    /// Identity directory.
    pub identities: InMemoryIdentityStore,
    /// The service under test.
    pub service: SessionService<B, InMemoryIdentityStore>,
    /// An active [`Role::Member`] identity.
    pub member_id: SubjectId,
    /// An active [`Role::Admin`] identity.
    pub admin_id: SubjectId,
}

impl TestHarness<MemoryBackend> {
    /// Harness over a fresh [`MemoryBackend`] with default configuration.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), AuthConfig::default())
    }
}

impl Default for TestHarness<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: StorageBackend> TestHarness<B> {
    /// Harness over `backend` with `config`.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    #[allow(clippy::expect_used)]
    pub fn with_backend(backend: Arc<B>, config: AuthConfig) -> Self {
        config.validate().expect("valid test config");

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let secrets = Arc::new(SigningSecrets::generate());
        let codec = CredentialCodec::new(Arc::clone(&secrets), clock.clone(), &config).expect("codec");

        let member_id = SubjectId(1001);
        let admin_id = SubjectId(1002);
        let identities = InMemoryIdentityStore::new();
        identities.insert(Identity::builder().id(member_id).email("member@example.com").build());
        identities.insert(Identity::builder().id(admin_id).email("admin@example.com").role(Role::Admin).build());

        let service = SessionService::new(
            codec,
            RevocationLedger::new(Arc::clone(&backend)),
            Arc::new(identities.clone()),
            config,
        );

        Self { backend, clock, secrets, identities, service, member_id, admin_id }
    }
}

/// Asserts that a `Result<T, AuthError>` is an `Err` of the given
/// [`AuthError`](crate::error::AuthError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use taskhub_authn::{assert_auth_error, error::AuthError};
///
/// let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::AuthError;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
    }

    #[test]
    fn test_craft_raw_jwt_has_empty_signature() {
        let jwt = craft_raw_jwt(&json!({"alg": "none"}), &json!({"sub": "1"}));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty());
    }

    #[test]
    fn test_assert_auth_error_matches_struct_variants() {
        let result: Result<(), AuthError> = Err(AuthError::rate_limited(Duration::from_secs(1)));
        assert_auth_error!(result, RateLimited);
    }
}
