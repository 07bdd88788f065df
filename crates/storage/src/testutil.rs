//! Shared test utilities for storage testing.
//!
//! Feature-gated behind `testutil` so nothing here leaks into production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! taskhub-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use taskhub_storage::testutil::FaultyBackend;
//! ```

use std::{
    ops::RangeBounds,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    transaction::Transaction,
    types::{Counter, KeyValue},
};

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    failing_commits: AtomicU32,
    commit_attempts: AtomicU32,
}

impl Faults {
    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected outage"));
        }
        Ok(())
    }

    fn take_commit_failure(&self) -> bool {
        self.failing_commits.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }
}

/// Backend wrapper that injects failures on demand.
///
/// - [`set_unavailable`](Self::set_unavailable) makes every operation fail
///   with a transient [`StorageError::Connection`].
/// - [`fail_next_commits`](Self::fail_next_commits) makes the next `n`
///   transaction commits fail (transiently) without applying anything.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use taskhub_storage::{MemoryBackend, StorageBackend, testutil::FaultyBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = FaultyBackend::new(MemoryBackend::new());
/// backend.set_unavailable(true);
/// assert!(backend.get(b"k").await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct FaultyBackend<B> {
    inner: B,
    faults: Arc<Faults>,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: B) -> Self {
        Self { inner, faults: Arc::new(Faults::default()) }
    }

    /// Returns the wrapped backend, bypassing fault injection.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Toggles a total outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails the next `count` transaction commits.
    pub fn fail_next_commits(&self, count: u32) {
        self.faults.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Number of transaction commits attempted so far, failed or not.
    pub fn commit_attempts(&self) -> u32 {
        self.faults.commit_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.faults.check_available()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.faults.check_available()?;
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.faults.check_available()?;
        self.inner.compare_and_set(key, expected, new_value).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.faults.check_available()?;
        self.inner.delete(key).await
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        self.faults.check_available()?;
        self.inner.get_range(range).await
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.faults.check_available()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn increment_with_ttl(&self, key: Vec<u8>, ttl: Duration) -> StorageResult<Counter> {
        self.faults.check_available()?;
        self.inner.increment_with_ttl(key, ttl).await
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        self.faults.check_available()?;
        let inner = self.inner.transaction().await?;
        Ok(Box::new(FaultyTransaction { inner, faults: Arc::clone(&self.faults) }))
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.faults.check_available()?;
        self.inner.health_check().await
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.faults.check_available()?;
        self.inner.get(key).await
    }

    async fn get_for_update(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.faults.check_available()?;
        self.inner.get_for_update(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.set(key, value);
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.inner.delete(key);
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.inner.compare_and_set(key, expected, new_value)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.faults.commit_attempts.fetch_add(1, Ordering::SeqCst);
        self.faults.check_available()?;
        if self.faults.take_commit_failure() {
            // Dropping the inner transaction discards its writes.
            return Err(StorageError::connection("injected commit failure"));
        }
        self.inner.commit().await
    }
}

/// Assert that a result is an `Err` matching the given [`StorageError`]
/// pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use taskhub_storage::{StorageError, StorageResult, assert_storage_error};
///
/// let result: StorageResult<()> = Err(StorageError::not_found("k"));
/// assert_storage_error!(result, StorageError::NotFound { .. });
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {},
            other => panic!(
                "expected Err({}), got: {:?}",
                stringify!($pattern),
                other,
            ),
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok` and return the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    #[tokio::test]
    async fn test_outage_is_transient() {
        let backend = FaultyBackend::new(MemoryBackend::new());
        backend.set_unavailable(true);
        let err = backend.set(b"k".to_vec(), b"v".to_vec()).await.unwrap_err();
        assert!(err.is_transient());

        backend.set_unavailable(false);
        assert_storage_ok!(backend.set(b"k".to_vec(), b"v".to_vec()).await);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let backend = FaultyBackend::new(MemoryBackend::new());
        backend.fail_next_commits(1);

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"k".to_vec(), b"v".to_vec());
        assert_storage_error!(txn.commit().await, StorageError::Connection { .. });
        assert_eq!(backend.get(b"k").await.unwrap(), None);

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"k".to_vec(), b"v".to_vec());
        txn.commit().await.unwrap();
        assert_eq!(backend.get(b"k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(backend.commit_attempts(), 2);
    }
}
