//! Transaction trait for atomic storage operations.
//!
//! A [`Transaction`] is a unit of work: writes are buffered, preconditions
//! are checked at commit, and nothing becomes visible unless
//! [`commit`](Transaction::commit) succeeds. Dropping a transaction is a
//! rollback.
//!
//! # Row locks
//!
//! [`get_for_update`](Transaction::get_for_update) reads a key and takes an
//! exclusive lock on it for the lifetime of the transaction. Other
//! transactions calling `get_for_update` on the same key wait until this one
//! commits or is dropped; transactions touching other keys are unaffected.
//! Plain reads never wait.
//!
//! # Example
//!
//! ```
//! use taskhub_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! backend.set(b"row".to_vec(), b"v1".to_vec()).await.unwrap();
//!
//! let mut txn = backend.transaction().await.unwrap();
//! let current = txn.get_for_update(b"row").await.unwrap();
//! assert_eq!(current.as_deref(), Some(&b"v1"[..]));
//! txn.compare_and_set(b"row".to_vec(), current.map(|b| b.to_vec()), b"v2".to_vec()).unwrap();
//! txn.commit().await.unwrap();
//!
//! assert_eq!(backend.get(b"row").await.unwrap().as_deref(), Some(&b"v2"[..]));
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Transaction handle for atomic multi-operation commits.
///
/// Transactions support read-your-writes: [`get`](Transaction::get) sees
/// pending writes from the same transaction.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Gets a value within the transaction, consulting pending writes first.
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Reads a key and holds an exclusive lock on it until the transaction
    /// ends.
    ///
    /// Calling it twice for the same key within one transaction does not
    /// deadlock; the second call just re-reads.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Timeout`](crate::StorageError::Timeout) if the
    /// lock cannot be acquired within the backend's lock timeout.
    async fn get_for_update(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Buffers a set operation.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers a delete operation.
    fn delete(&mut self, key: Vec<u8>);

    /// Buffers a compare-and-set operation checked at commit time.
    ///
    /// `expected: None` requires the key to be absent. If any condition
    /// fails at commit, the whole transaction fails with
    /// [`StorageError::Conflict`](crate::StorageError::Conflict) and nothing
    /// is applied.
    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Commits all buffered operations atomically and releases held locks.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if a
    ///   compare-and-set precondition no longer holds
    /// - Other [`StorageError`](crate::StorageError) variants on backend failures
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
