//! Revocation ledger for refresh credentials.
//!
//! The ledger is the single source of truth for whether a refresh credential
//! may still be exchanged. It is layered on any [`StorageBackend`] with this
//! key layout:
//!
//! | Key | Value |
//! |-----|-------|
//! | `refresh/record/{id}` | JSON-encoded [`RefreshRecord`] |
//! | `refresh/hash/{hash}` | record id (unique index, insert-if-absent) |
//! | `refresh/subject/{subject}/{id}` | empty (per-subject index) |
//!
//! Exchanges go through a [`LedgerUnitOfWork`], which locks the record row
//! for the duration of the exchange and applies the revoke-and-insert as
//! one atomic commit.
//!
//! [`StorageBackend`]: crate::StorageBackend

mod record;
mod store;

pub use record::{RecordState, RefreshRecord};
pub use store::{LedgerUnitOfWork, RevocationLedger, RevokeOutcome};

use crate::types::{RecordId, SubjectId};

const RECORD_PREFIX: &str = "refresh/record/";
const HASH_PREFIX: &str = "refresh/hash/";
const SUBJECT_PREFIX: &str = "refresh/subject/";

fn record_key(id: RecordId) -> Vec<u8> {
    format!("{RECORD_PREFIX}{id}").into_bytes()
}

fn hash_key(credential_hash: &str) -> Vec<u8> {
    format!("{HASH_PREFIX}{credential_hash}").into_bytes()
}

fn subject_key(subject_id: SubjectId, id: RecordId) -> Vec<u8> {
    format!("{SUBJECT_PREFIX}{subject_id}/{id}").into_bytes()
}

/// Half-open key range covering every index entry of one subject.
fn subject_range(subject_id: SubjectId) -> std::ops::Range<Vec<u8>> {
    let start = format!("{SUBJECT_PREFIX}{subject_id}/").into_bytes();
    // '0' is the byte after '/'.
    let end = format!("{SUBJECT_PREFIX}{subject_id}0").into_bytes();
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(record_key(RecordId(5)), b"refresh/record/5".to_vec());
        assert_eq!(hash_key("abcd"), b"refresh/hash/abcd".to_vec());
        assert_eq!(subject_key(SubjectId(1), RecordId(9)), b"refresh/subject/1/9".to_vec());
    }

    #[test]
    fn test_subject_range_excludes_prefix_siblings() {
        let range = subject_range(SubjectId(1));
        assert!(range.contains(&subject_key(SubjectId(1), RecordId(42))));
        assert!(!range.contains(&subject_key(SubjectId(10), RecordId(42))));
        assert!(!range.contains(&subject_key(SubjectId(2), RecordId(42))));
    }
}
