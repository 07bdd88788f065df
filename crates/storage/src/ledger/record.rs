//! Refresh-record type stored in the revocation ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RecordId, SubjectId};

/// Lifecycle state of a [`RefreshRecord`] evaluated at a given instant.
///
/// ```text
/// ┌──────────┐  rotate / sign-out  ┌──────────┐
/// │  Active  │────────────────────►│ Revoked  │
/// └────┬─────┘                     └──────────┘
///      │ expires_at <= now
///      ▼
/// ┌──────────┐
/// │ Expired  │
/// └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not revoked and not yet expired; may be exchanged once.
    Active,
    /// Revoked (exchanged, signed out, or revoked in bulk). Terminal.
    Revoked,
    /// Past its expiry without having been revoked. Terminal.
    Expired,
}

/// Ledger entry for one issued refresh credential.
///
/// Only the credential hash is stored, never the credential itself.
///
/// Records are created on sign-in and rotation and are only ever mutated to
/// set `revoked_at` (and `replaced_by` on rotation). They are never
/// hard-deleted.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use taskhub_storage::{RecordState, SubjectId, ledger::RefreshRecord};
///
/// let now = Utc::now();
/// let record = RefreshRecord::builder()
///     .subject_id(SubjectId(7))
///     .credential_hash("ab12".to_owned())
///     .expires_at(now + Duration::days(14))
///     .created_at(now)
///     .build();
///
/// assert_eq!(record.state_at(now), RecordState::Active);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct RefreshRecord {
    /// Record identifier.
    #[builder(default = RecordId::generate())]
    pub id: RecordId,

    /// Identity the credential was issued to.
    pub subject_id: SubjectId,

    /// Hex-encoded SHA-256 of the refresh credential. Unique across the
    /// ledger.
    #[builder(into)]
    pub credential_hash: String,

    /// When the credential stops being exchangeable.
    pub expires_at: DateTime<Utc>,

    /// When the record was revoked, if it has been.
    pub revoked_at: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Record that superseded this one through rotation.
    #[serde(default)]
    pub replaced_by: Option<RecordId>,
}

impl RefreshRecord {
    /// Evaluates the record's state at `now`. Revocation takes precedence
    /// over expiry.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> RecordState {
        if self.revoked_at.is_some() {
            RecordState::Revoked
        } else if self.expires_at <= now {
            RecordState::Expired
        } else {
            RecordState::Active
        }
    }

    /// Returns `true` if the record has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
