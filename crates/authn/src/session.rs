//! Sessions: sign-in, refresh rotation and sign-out.
//!
//! # Rotation protocol
//!
//! A refresh credential may be exchanged **exactly once**. [`SessionService::rotate`]:
//!
//! 1. Verifies the credential (signature, kind, expiry) without touching
//!    the ledger
//! 2. Opens a ledger unit of work and locks the record for the
//!    credential's hash
//! 3. Rejects unknown and revoked records with
//!    [`AuthError::InvalidCredential`] (indistinguishable to callers) and
//!    expired ones with [`AuthError::TokenExpired`]
//! 4. Requires the identity to still be active
//! 5. Marks the old record revoked, issues a new pair and inserts its record
//! 6. Commits; only then are the new credentials returned
//!
//! Any failure after step 2 drops the unit of work, so the old record stays
//! active and the client may retry. Concurrent exchanges of the same
//! credential serialize on the row lock; every loser observes the record as
//! revoked.
//!
//! Transient ledger failures are retried once with backoff and bounded by
//! the configured store timeout, then surface as
//! [`AuthError::Unavailable`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fail::fail_point;
use taskhub_storage::{
    RecordState, RevokeOutcome, StorageBackend, StorageError, SubjectId,
    ledger::{RefreshRecord, RevocationLedger},
    with_retry_timeout,
};

use crate::{
    codec::{CredentialCodec, CredentialKind, IssuedCredential, VerifiedCredential, hash_credential},
    config::AuthConfig,
    error::{AuthError, Result},
    identity::{ExternalAssertion, Identity, IdentityStore, PublicProfile},
    transport::{SetCookie, clearing_cookies},
};

/// A freshly issued credential pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// Access credential.
    pub access: IssuedCredential,
    /// Refresh credential; its hash is recorded in the ledger.
    pub refresh: IssuedCredential,
    /// Profile of the signed-in identity.
    pub profile: PublicProfile,
}

/// Result of [`SessionService::sign_out`].
#[derive(Debug, Clone)]
pub struct SignOut {
    /// `true` if this call revoked a record.
    pub revoked: bool,
    /// Cookies that delete both session cookies.
    pub cookies: [SetCookie; 2],
}

/// Issues, rotates and revokes sessions.
pub struct SessionService<B, I> {
    codec: CredentialCodec,
    ledger: RevocationLedger<B>,
    identities: Arc<I>,
    config: AuthConfig,
}

impl<B, I> std::fmt::Debug for SessionService<B, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("issuer", &self.config.issuer)
            .field("store_timeout", &self.config.store_timeout)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend, I: IdentityStore> SessionService<B, I> {
    /// Creates a service. `codec` must have been built from the same
    /// `config`.
    pub fn new(codec: CredentialCodec, ledger: RevocationLedger<B>, identities: Arc<I>, config: AuthConfig) -> Self {
        Self { codec, ledger, identities, config }
    }

    /// The credential codec.
    #[must_use]
    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    /// The revocation ledger.
    #[must_use]
    pub fn ledger(&self) -> &RevocationLedger<B> {
        &self.ledger
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Starts a session for an identity whose credentials were checked by
    /// the caller.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthenticated`] if the identity is unknown
    /// - [`AuthError::Forbidden`] if it is not active
    /// - [`AuthError::Unavailable`] if the ledger cannot be reached
    #[tracing::instrument(skip(self))]
    pub async fn sign_in(&self, subject_id: SubjectId) -> Result<IssuedSession> {
        let identity = self.identities.find_identity(subject_id).await?.ok_or(AuthError::Unauthenticated)?;
        self.start_session(&identity).await
    }

    /// Starts a session from a verified social-provider assertion.
    ///
    /// # Errors
    ///
    /// As [`sign_in`](Self::sign_in); an assertion linked to no identity is
    /// [`AuthError::Unauthenticated`].
    #[tracing::instrument(skip(self, assertion), fields(provider = %assertion.provider))]
    pub async fn sign_in_external(&self, assertion: &ExternalAssertion) -> Result<IssuedSession> {
        let identity = self
            .identities
            .find_by_external(&assertion.provider, &assertion.external_subject)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        self.start_session(&identity).await
    }

    async fn start_session(&self, identity: &Identity) -> Result<IssuedSession> {
        if !identity.is_active() {
            return Err(AuthError::Forbidden);
        }

        let access = self.codec.issue_short_lived(identity.id, identity.role)?;
        let refresh = self.codec.issue_long_lived(identity.id, identity.role)?;
        let hash = hash_credential(&refresh.token);
        let now = self.codec.clock().now();

        let ledger = &self.ledger;
        let hash = hash.as_str();
        let (subject_id, expires_at) = (identity.id, refresh.expires_at);
        let record = with_retry_timeout(&self.config.retry, self.config.store_timeout, "sign_in", || async move {
            ledger.record(subject_id, hash, expires_at, now).await.map_err(AuthError::from)
        })
        .await?;

        tracing::debug!(subject = %identity.id, record_id = %record.id, "session started");
        Ok(IssuedSession { access, refresh, profile: identity.profile() })
    }

    /// Resolves an access credential to an active identity.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExpired`] or [`AuthError::InvalidCredential`]
    ///   from verification
    /// - [`AuthError::Unauthenticated`] if the identity is gone or inactive
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, access_token: &str) -> Result<Identity> {
        let verified = self.codec.verify(access_token, CredentialKind::Access)?;
        match self.identities.find_identity(verified.subject_id).await? {
            Some(identity) if identity.is_active() => Ok(identity),
            _ => Err(AuthError::Unauthenticated),
        }
    }

    /// Exchanges a refresh credential for a new pair.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredential`] if the credential is forged,
    ///   unknown, already exchanged or revoked, or lost a concurrent exchange
    /// - [`AuthError::TokenExpired`] if it has expired
    /// - [`AuthError::Forbidden`] if the identity is no longer active
    /// - [`AuthError::Unavailable`] if the ledger stays unreachable
    #[tracing::instrument(skip_all)]
    pub async fn rotate(&self, refresh_token: &str) -> Result<IssuedSession> {
        let verified = self.codec.verify(refresh_token, CredentialKind::Refresh)?;
        let hash = hash_credential(refresh_token);

        with_retry_timeout(&self.config.retry, self.config.store_timeout, "rotate", || {
            self.exchange(&hash, &verified)
        })
        .await
    }

    async fn exchange(&self, hash: &str, verified: &VerifiedCredential) -> Result<IssuedSession> {
        let mut unit = self.ledger.begin().await?;
        let Some(record) = unit.lock_by_hash(hash).await? else {
            return Err(AuthError::invalid_credential("no ledger record for refresh credential"));
        };

        let now = self.codec.clock().now();
        match record.state_at(now) {
            RecordState::Active => {},
            RecordState::Revoked => {
                tracing::warn!(
                    subject = %record.subject_id,
                    record_id = %record.id,
                    replaced_by = ?record.replaced_by,
                    "revoked refresh credential presented again",
                );
                return Err(AuthError::InvalidCredential);
            },
            RecordState::Expired => return Err(AuthError::TokenExpired),
        }

        if record.subject_id != verified.subject_id {
            return Err(AuthError::invalid_credential("ledger subject mismatch"));
        }

        let identity = match self.identities.find_identity(record.subject_id).await? {
            Some(identity) if identity.is_active() => identity,
            _ => {
                tracing::warn!(subject = %record.subject_id, "rotation refused for inactive identity");
                return Err(AuthError::Forbidden);
            },
        };

        let access = self.codec.issue_short_lived(identity.id, identity.role)?;
        let refresh = self.codec.issue_long_lived(identity.id, identity.role)?;
        let successor = RefreshRecord::builder()
            .subject_id(identity.id)
            .credential_hash(hash_credential(&refresh.token))
            .expires_at(refresh.expires_at)
            .created_at(now)
            .build();

        unit.mark_revoked(&record, now, Some(successor.id))?;
        unit.insert(&successor)?;

        fail_point!("rotation-before-commit", |_| Err(AuthError::unavailable()));

        match unit.commit().await {
            Ok(()) => {},
            Err(StorageError::Conflict) => return Err(self.classify_commit_conflict(&successor).await),
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(
            subject = %identity.id,
            revoked = %record.id,
            issued = %successor.id,
            "refresh credential rotated",
        );
        Ok(IssuedSession { access, refresh, profile: identity.profile() })
    }

    /// A commit conflict either means the successor collided with an
    /// existing hash or id, or that the old record changed underneath the
    /// exchange. Only the latter is a lost exchange.
    async fn classify_commit_conflict(&self, successor: &RefreshRecord) -> AuthError {
        let collided = match (
            self.ledger.lookup(&successor.credential_hash).await,
            self.ledger.get(successor.id).await,
        ) {
            (Ok(by_hash), Ok(by_id)) => by_hash.is_some() || by_id.is_some(),
            (Err(e), _) | (_, Err(e)) => return e.into(),
        };
        if collided {
            tracing::warn!(subject = %successor.subject_id, "successor refresh record collided with an existing one");
            AuthError::Conflict
        } else {
            AuthError::invalid_credential("record changed during exchange")
        }
    }

    /// Ends a session.
    ///
    /// Idempotent. An authentic refresh credential has its record revoked,
    /// even if it has expired; missing, forged or unknown credentials are a
    /// no-op. The returned cookies always clear both session cookies.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] if the ledger cannot be reached.
    /// The caller should still clear the cookies with
    /// [`clearing_cookies`].
    #[tracing::instrument(skip_all, fields(has_token = refresh_token.is_some()))]
    pub async fn sign_out(&self, refresh_token: Option<&str>) -> Result<SignOut> {
        let cookies = clearing_cookies(&self.config.cookies);
        let Some(token) = refresh_token else {
            return Ok(SignOut { revoked: false, cookies });
        };
        if self.codec.verify_allow_expired(token, CredentialKind::Refresh).is_err() {
            return Ok(SignOut { revoked: false, cookies });
        }

        let hash = hash_credential(token);
        let now = self.codec.clock().now();
        let outcome = with_retry_timeout(&self.config.retry, self.config.store_timeout, "sign_out", || {
            self.revoke_by_hash(&hash, now)
        })
        .await?;

        Ok(SignOut { revoked: outcome == Some(RevokeOutcome::Revoked), cookies })
    }

    async fn revoke_by_hash(&self, hash: &str, now: DateTime<Utc>) -> Result<Option<RevokeOutcome>> {
        let Some(record) = self.ledger.lookup(hash).await? else {
            return Ok(None);
        };
        match self.ledger.revoke(record.id, now).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Revokes every refresh credential of a subject. Returns how many were
    /// still unrevoked.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] if the ledger cannot be reached.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out_everywhere(&self, subject_id: SubjectId) -> Result<usize> {
        let now = self.codec.clock().now();
        let ledger = &self.ledger;
        with_retry_timeout(&self.config.retry, self.config.store_timeout, "sign_out_everywhere", || async move {
            ledger.revoke_all_for_subject(subject_id, now).await.map_err(AuthError::from)
        })
        .await
    }
}
