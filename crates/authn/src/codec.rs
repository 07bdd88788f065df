//! Credential codec: issues and verifies signed credentials.
//!
//! Both credential kinds are EdDSA-signed JWTs with the same claim set,
//! distinguished by the `typ` claim and by being signed with independent
//! keys. Verification is pure: it depends only on the token, the clock and
//! the signing secrets.
//!
//! # Verification order
//!
//! 1. Header: algorithm must be EdDSA, `kid` must name the expected kind's key
//! 2. Signature under the expected kind's key
//! 3. Claims: `typ`, `iss`, and `iat` not in the future
//! 4. Expiry: `exp <= now` yields [`AuthError::TokenExpired`]
//!
//! Expiry is checked last, so a forged token that claims to be expired is
//! reported as [`AuthError::InvalidCredential`].

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use taskhub_storage::SubjectId;

use crate::{
    clock::Clock,
    config::{AuthConfig, MAX_CREDENTIAL_LIFETIME},
    error::AuthError,
    identity::Role,
    keys::SigningSecrets,
    validation::{validate_algorithm, validate_kid},
};

/// Random bytes in an access credential's `jti`.
const ACCESS_JTI_BYTES: usize = 16;

/// Random bytes in a refresh credential's `jti`. 256 bits make every
/// refresh credential, and therefore every ledger hash, unique.
const REFRESH_JTI_BYTES: usize = 32;

/// The two credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Short-lived credential presented on every request.
    Access,
    /// Long-lived credential exchanged for a new pair.
    Refresh,
}

impl CredentialKind {
    /// Value of the `typ` claim.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    /// Prefix of every `kid` of this kind.
    #[must_use]
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Access => "access-",
            Self::Refresh => "refresh-",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim set carried by both credential kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialClaims {
    /// Subject id as a decimal string.
    pub sub: String,
    /// Global role at issue time.
    pub role: Role,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expires at, seconds since the epoch.
    pub exp: i64,
    /// Credential kind.
    pub typ: CredentialKind,
    /// Issuer.
    pub iss: String,
    /// Random unique id, base64url.
    pub jti: String,
}

/// A freshly signed credential.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    /// The encoded JWT.
    pub token: String,
    /// Expiry, truncated to whole seconds like the `exp` claim.
    pub expires_at: DateTime<Utc>,
    /// The `jti` claim.
    pub jti: String,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("jti", &self.jti)
            .finish()
    }
}

/// Claims of a credential that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// Subject the credential was issued to.
    pub subject_id: SubjectId,
    /// Role at issue time.
    pub role: Role,
    /// Credential kind.
    pub kind: CredentialKind,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// The `jti` claim.
    pub jti: String,
}

/// Issues and verifies access and refresh credentials.
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    secrets: Arc<SigningSecrets>,
    clock: Arc<dyn Clock>,
    issuer: String,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
}

impl CredentialCodec {
    /// Creates a codec from the lifetimes and issuer in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if a lifetime does not fit a
    /// calendar duration.
    pub fn new(
        secrets: Arc<SigningSecrets>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        let to_delta = |ttl: std::time::Duration| {
            if ttl > MAX_CREDENTIAL_LIFETIME {
                return Err(AuthError::configuration("credential lifetime out of range"));
            }
            TimeDelta::from_std(ttl).map_err(|_| AuthError::configuration("credential lifetime out of range"))
        };
        Ok(Self {
            secrets,
            clock,
            issuer: config.issuer.clone(),
            access_ttl: to_delta(config.access_ttl)?,
            refresh_ttl: to_delta(config.refresh_ttl)?,
        })
    }

    /// The clock this codec reads.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Issues an access credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if signing fails.
    pub fn issue_short_lived(&self, subject_id: SubjectId, role: Role) -> Result<IssuedCredential, AuthError> {
        self.issue(subject_id, role, CredentialKind::Access)
    }

    /// Issues a refresh credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if signing fails.
    pub fn issue_long_lived(&self, subject_id: SubjectId, role: Role) -> Result<IssuedCredential, AuthError> {
        self.issue(subject_id, role, CredentialKind::Refresh)
    }

    #[tracing::instrument(skip(self), fields(subject = %subject_id))]
    fn issue(&self, subject_id: SubjectId, role: Role, kind: CredentialKind) -> Result<IssuedCredential, AuthError> {
        let (ttl, jti_len) = match kind {
            CredentialKind::Access => (self.access_ttl, ACCESS_JTI_BYTES),
            CredentialKind::Refresh => (self.refresh_ttl, REFRESH_JTI_BYTES),
        };

        let now = self.clock.now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::configuration("credential expiry out of range"))?
            .timestamp();
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::configuration("credential expiry out of range"))?;

        let mut jti_bytes = vec![0u8; jti_len];
        OsRng.fill_bytes(&mut jti_bytes);
        let jti = URL_SAFE_NO_PAD.encode(&jti_bytes);

        let claims = CredentialClaims {
            sub: subject_id.to_string(),
            role,
            iat: now.timestamp(),
            exp,
            typ: kind,
            iss: self.issuer.clone(),
            jti: jti.clone(),
        };

        let pair = self.secrets.for_kind(kind);
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(pair.kid().to_owned());

        let token = encode(&header, &claims, pair.encoding_key())
            .map_err(|e| AuthError::configuration(format!("failed to sign {kind} credential: {e}")))?;

        tracing::debug!(%kind, "issued credential");
        Ok(IssuedCredential { token, expires_at, jti })
    }

    /// Verifies a credential of the given kind.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExpired`] if the credential is authentic but past
    ///   its expiry
    /// - [`AuthError::InvalidCredential`] for anything else that fails
    #[tracing::instrument(skip(self, token))]
    pub fn verify(&self, token: &str, kind: CredentialKind) -> Result<VerifiedCredential, AuthError> {
        let verified = self.verify_allow_expired(token, kind)?;
        if verified.expires_at <= self.clock.now() {
            return Err(AuthError::TokenExpired);
        }
        Ok(verified)
    }

    /// Verifies everything except expiry.
    ///
    /// Used where an expired but authentic credential is still meaningful,
    /// such as signing out.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if the credential is not
    /// authentic or not of `kind`.
    pub fn verify_allow_expired(
        &self,
        token: &str,
        kind: CredentialKind,
    ) -> Result<VerifiedCredential, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::invalid_credential("malformed header"))?;
        validate_algorithm(&format!("{:?}", header.alg))?;

        let pair = self.secrets.for_kind(kind);
        validate_kid(header.kid.as_deref(), kind, pair.kid())?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<CredentialClaims>(token, pair.decoding_key(), &validation)?.claims;

        if claims.typ != kind {
            return Err(AuthError::invalid_credential("credential kind mismatch"));
        }
        if claims.iss != self.issuer {
            return Err(AuthError::invalid_credential("issuer mismatch"));
        }
        if claims.iat > self.clock.now().timestamp() {
            return Err(AuthError::invalid_credential("issued in the future"));
        }

        let subject_id = claims
            .sub
            .parse::<i64>()
            .map(SubjectId)
            .map_err(|_| AuthError::invalid_credential("subject is not an id"))?;
        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| AuthError::invalid_credential("iat out of range"))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::invalid_credential("exp out of range"))?;

        Ok(VerifiedCredential { subject_id, role: claims.role, kind, issued_at, expires_at, jti: claims.jti })
    }
}

/// Derives the ledger key of a refresh credential: hex-encoded SHA-256.
///
/// ```
/// use taskhub_authn::codec::hash_credential;
///
/// let hash = hash_credential("token");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_credential("token"));
/// ```
#[must_use]
pub fn hash_credential(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
