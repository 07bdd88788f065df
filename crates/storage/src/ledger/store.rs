//! [`RevocationLedger`] and its unit of work.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{RefreshRecord, hash_key, record_key, subject_key, subject_range};
use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    transaction::Transaction,
    types::{RecordId, SubjectId},
};

/// Result of revoking a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The record was active (or expired) and is now revoked.
    Revoked,
    /// The record had already been revoked; nothing changed.
    AlreadyRevoked,
}

/// Persistent ledger of issued refresh credentials.
///
/// Cheap to clone; clones share the backend.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::{Duration, Utc};
/// use taskhub_storage::{MemoryBackend, RevokeOutcome, SubjectId, ledger::RevocationLedger};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let ledger = RevocationLedger::new(Arc::new(MemoryBackend::new()));
/// let now = Utc::now();
///
/// let record = ledger.record(SubjectId(1), "hash-1", now + Duration::days(14), now).await.unwrap();
/// assert_eq!(ledger.lookup("hash-1").await.unwrap(), Some(record.clone()));
///
/// assert_eq!(ledger.revoke(record.id, now).await.unwrap(), RevokeOutcome::Revoked);
/// assert_eq!(ledger.revoke(record.id, now).await.unwrap(), RevokeOutcome::AlreadyRevoked);
/// # });
/// ```
pub struct RevocationLedger<B> {
    backend: Arc<B>,
}

impl<B> Clone for RevocationLedger<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend) }
    }
}

impl<B: StorageBackend> RevocationLedger<B> {
    /// Creates a ledger over the given backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Creates a new active record for a freshly issued credential.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if `credential_hash` is already
    /// present in the ledger.
    #[tracing::instrument(skip(self, credential_hash), fields(subject = %subject_id))]
    pub async fn record(
        &self,
        subject_id: SubjectId,
        credential_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<RefreshRecord> {
        let record = RefreshRecord::builder()
            .subject_id(subject_id)
            .credential_hash(credential_hash)
            .expires_at(expires_at)
            .created_at(now)
            .build();

        let mut unit = self.begin().await?;
        unit.insert(&record)?;
        unit.commit().await?;

        debug!(record_id = %record.id, "recorded refresh credential");
        Ok(record)
    }

    /// Finds the record for a credential hash.
    #[tracing::instrument(skip_all)]
    pub async fn lookup(&self, credential_hash: &str) -> StorageResult<Option<RefreshRecord>> {
        let Some(raw_id) = self.backend.get(&hash_key(credential_hash)).await? else {
            return Ok(None);
        };
        let id = decode_record_id(&raw_id)?;
        self.get(id).await
    }

    /// Loads a record by id.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: RecordId) -> StorageResult<Option<RefreshRecord>> {
        match self.backend.get(&record_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Revokes a record. Idempotent.
    ///
    /// Takes the record's row lock, so it serializes with in-flight
    /// exchanges of the same credential.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no record has this id.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, id: RecordId, now: DateTime<Utc>) -> StorageResult<RevokeOutcome> {
        let mut unit = self.begin().await?;
        let Some(record) = unit.lock_record(id).await? else {
            return Err(StorageError::not_found(format!("refresh record {id}")));
        };
        if record.is_revoked() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        unit.mark_revoked(&record, now, None)?;
        unit.commit().await?;

        info!(subject = %record.subject_id, record_id = %id, "revoked refresh credential");
        Ok(RevokeOutcome::Revoked)
    }

    /// Revokes every record of a subject and returns how many were newly
    /// revoked.
    ///
    /// The subject index is re-scanned until a pass turns up no record it
    /// has not already visited. An exchange that held a row lock when the
    /// sweep reached it commits its successor before the lock is released,
    /// so the next pass picks the successor up.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all_for_subject(
        &self,
        subject_id: SubjectId,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut revoked = 0;
        let mut visited = HashSet::new();
        let mut passes = 0u32;
        loop {
            let pending: Vec<RecordId> = self
                .subject_record_ids(subject_id)
                .await?
                .into_iter()
                .filter(|id| !visited.contains(id))
                .collect();
            if pending.is_empty() {
                break;
            }
            passes += 1;

            for id in pending {
                visited.insert(id);
                match self.revoke(id, now).await {
                    Ok(RevokeOutcome::Revoked) => revoked += 1,
                    Ok(RevokeOutcome::AlreadyRevoked) | Err(StorageError::NotFound { .. }) => {},
                    Err(e) => return Err(e),
                }
            }
        }

        if passes > 1 {
            debug!(passes, "successors appeared during sweep");
        }

        info!(revoked, "revoked all refresh credentials for subject");
        Ok(revoked)
    }

    /// Lists every record of a subject, oldest id first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_subject(&self, subject_id: SubjectId) -> StorageResult<Vec<RefreshRecord>> {
        let mut records = Vec::new();
        for id in self.subject_record_ids(subject_id).await? {
            if let Some(record) = self.get(id).await? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Opens a unit of work for an atomic exchange.
    pub async fn begin(&self) -> StorageResult<LedgerUnitOfWork> {
        Ok(LedgerUnitOfWork { txn: self.backend.transaction().await?, locked: HashMap::new() })
    }

    async fn subject_record_ids(&self, subject_id: SubjectId) -> StorageResult<Vec<RecordId>> {
        let entries = self.backend.get_range(subject_range(subject_id)).await?;
        entries
            .iter()
            .map(|kv| {
                let key = std::str::from_utf8(&kv.key)
                    .map_err(|e| StorageError::serialization_with_source("subject index key", e))?;
                let id = key
                    .rsplit('/')
                    .next()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| StorageError::serialization("malformed subject index key"))?;
                Ok(RecordId(id))
            })
            .collect()
    }
}

/// An open ledger transaction.
///
/// Rows locked through [`lock_by_hash`](Self::lock_by_hash) stay locked
/// until [`commit`](Self::commit) or drop. Dropping without committing
/// discards every buffered change.
pub struct LedgerUnitOfWork {
    txn: Box<dyn Transaction>,
    /// Serialized form of each locked record as read, used as the commit
    /// precondition.
    locked: HashMap<RecordId, Bytes>,
}

impl LedgerUnitOfWork {
    /// Locks and loads the record for a credential hash.
    ///
    /// Returns `Ok(None)` if the ledger has no such hash.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Timeout`] if the row lock could not be taken
    /// within the backend's lock timeout.
    #[tracing::instrument(skip_all)]
    pub async fn lock_by_hash(&mut self, credential_hash: &str) -> StorageResult<Option<RefreshRecord>> {
        let Some(raw_id) = self.txn.get_for_update(&hash_key(credential_hash)).await? else {
            return Ok(None);
        };
        let id = decode_record_id(&raw_id)?;
        self.lock_record(id).await
    }

    async fn lock_record(&mut self, id: RecordId) -> StorageResult<Option<RefreshRecord>> {
        let Some(raw) = self.txn.get_for_update(&record_key(id)).await? else {
            return Ok(None);
        };
        let record: RefreshRecord = serde_json::from_slice(&raw)?;
        self.locked.insert(id, raw);
        Ok(Some(record))
    }

    /// Buffers the revocation of a record locked in this unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the record was not locked here.
    pub fn mark_revoked(
        &mut self,
        record: &RefreshRecord,
        now: DateTime<Utc>,
        replaced_by: Option<RecordId>,
    ) -> StorageResult<()> {
        let Some(original) = self.locked.get(&record.id) else {
            return Err(StorageError::internal("record is not locked by this unit of work"));
        };

        let mut revoked = record.clone();
        revoked.revoked_at = Some(now);
        revoked.replaced_by = replaced_by;

        let encoded = serde_json::to_vec(&revoked)?;
        self.txn.compare_and_set(record_key(record.id), Some(original.to_vec()), encoded)
    }

    /// Buffers the insertion of a new record.
    ///
    /// The hash index and the record row are both written insert-if-absent,
    /// so a duplicate hash fails the whole commit with
    /// [`StorageError::Conflict`].
    pub fn insert(&mut self, record: &RefreshRecord) -> StorageResult<()> {
        let encoded = serde_json::to_vec(record)?;
        self.txn.compare_and_set(
            hash_key(&record.credential_hash),
            None,
            record.id.to_string().into_bytes(),
        )?;
        self.txn.compare_and_set(record_key(record.id), None, encoded)?;
        self.txn.set(subject_key(record.subject_id, record.id), Vec::new());
        Ok(())
    }

    /// Applies every buffered change atomically and releases the row locks.
    pub async fn commit(self) -> StorageResult<()> {
        self.txn.commit().await
    }
}

fn decode_record_id(raw: &[u8]) -> StorageResult<RecordId> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map(RecordId)
        .ok_or_else(|| StorageError::serialization("malformed record id in hash index"))
}
