//! Storage backend trait definition.
//!
//! [`StorageBackend`] is the minimal key-value contract the session core is
//! built on. The revocation ledger and the rate-limit counters are both
//! expressed in terms of it, so production deployments can swap the
//! in-memory backend for a shared store without touching protocol code.
//!
//! # Design
//!
//! - **Keys and values are bytes**: no assumptions about serialization format
//! - **Async by default**: every operation may be a remote round-trip
//! - **Atomic single-key primitives**: [`compare_and_set`](StorageBackend::compare_and_set)
//!   and [`increment_with_ttl`](StorageBackend::increment_with_ttl) are linearizable
//! - **Transactional**: multi-key units of work with per-key exclusive locks

use std::{ops::RangeBounds, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::StorageResult,
    transaction::Transaction,
    types::{Counter, KeyValue},
};

/// Abstract storage backend for key-value operations.
///
/// Backends must be `Send + Sync` and safe for concurrent use from many
/// request tasks.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a key-value pair |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Atomic compare-and-swap |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`get_range`](StorageBackend::get_range) | Retrieve keys in a range |
/// | [`set_with_ttl`](StorageBackend::set_with_ttl) | Store with automatic expiration |
/// | [`increment_with_ttl`](StorageBackend::increment_with_ttl) | Atomic counter with expiry on create |
/// | [`transaction`](StorageBackend::transaction) | Begin an atomic unit of work |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use taskhub_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// let value = backend.get(b"key").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("value")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value and clearing
    /// any TTL on the key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically sets a key's value if it matches the expected current value.
    ///
    /// - **`expected: None`**: insert-if-absent. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if a live value is present.
    /// - **`expected: Some(value)`**: update-if-unchanged. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if the key is absent or holds
    ///   different bytes.
    ///
    /// The comparison is exact byte equality. Expired keys are treated as
    /// absent. On success any TTL on the key is cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskhub_storage::{MemoryBackend, StorageBackend, StorageError};
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
    /// let backend = MemoryBackend::new();
    /// backend.compare_and_set(b"lock", None, b"holder-1".to_vec()).await.unwrap();
    ///
    /// let second = backend.compare_and_set(b"lock", None, b"holder-2".to_vec()).await;
    /// assert!(matches!(second, Err(StorageError::Conflict)));
    /// # });
    /// ```
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Deletes a key. Deleting a missing key is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all live key-value pairs within a range, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Stores a key-value pair that expires after `ttl`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Atomically increments the counter at `key`.
    ///
    /// When the counter does not exist (or its TTL has elapsed) it is created
    /// with count 1 and an expiry of `ttl` **in the same atomic step**.
    /// Later increments within the window leave the expiry untouched, so a
    /// burst of concurrent first requests can never push the window forward.
    ///
    /// # Errors
    ///
    /// Returns [`Serialization`](crate::StorageError::Serialization) if the key
    /// holds a value that is not a counter.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use taskhub_storage::{MemoryBackend, StorageBackend};
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
    /// let backend = MemoryBackend::new();
    /// let window = Duration::from_secs(60);
    ///
    /// assert_eq!(backend.increment_with_ttl(b"hits".to_vec(), window).await.unwrap().count, 1);
    /// assert_eq!(backend.increment_with_ttl(b"hits".to_vec(), window).await.unwrap().count, 2);
    /// # });
    /// ```
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn increment_with_ttl(&self, key: Vec<u8>, ttl: Duration) -> StorageResult<Counter>;

    /// Begins a new transaction.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Verifies the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
