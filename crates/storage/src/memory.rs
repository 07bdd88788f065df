//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] used by tests and single-process deployments.
//!
//! # Features
//!
//! - **Thread-safe**: one [`parking_lot::RwLock`] guards the ordered key space
//! - **Ordered storage**: keys live in a [`BTreeMap`] for range queries
//! - **TTL support**: expiry is checked on every read; a background task
//!   reclaims expired entries
//! - **Row locks**: [`Transaction::get_for_update`] takes a per-key async
//!   lock held until commit or drop
//!
//! Expiry is measured with [`tokio::time::Instant`], so tests running on a
//! paused clock can step across TTL boundaries with
//! [`tokio::time::advance`].
//!
//! # Example
//!
//! ```
//! use taskhub_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//!
//! let value = backend.get(b"greeting").await.unwrap();
//! assert_eq!(value.unwrap().as_ref(), b"hello");
//! # });
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    ops::{Bound, RangeBounds},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::{
    select,
    sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch},
    time::{Instant, sleep},
};
use tracing::{debug, trace};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    transaction::Transaction,
    types::{Counter, KeyValue},
};

/// Default bound on how long [`Transaction::get_for_update`] waits for a
/// row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

type Shared = Arc<RwLock<BTreeMap<Vec<u8>, Entry>>>;
type LockTable = Arc<Mutex<HashMap<Vec<u8>, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Vec<u8>) -> Self {
        Self { value: Bytes::from(value), expires_at: None }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn expiry(now: Instant, ttl: Duration) -> StorageResult<Instant> {
    now.checked_add(ttl).ok_or_else(|| StorageError::internal("ttl exceeds the representable time range"))
}

fn live_value(data: &BTreeMap<Vec<u8>, Entry>, key: &[u8], now: Instant) -> Option<Bytes> {
    data.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value.clone())
}

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable. All clones share the same data and
/// the same row-lock table.
///
/// # Shutdown
///
/// The background cleanup task stops when the last clone is dropped, or
/// explicitly via [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct MemoryBackend {
    data: Shared,
    row_locks: LockTable,
    lock_timeout: Duration,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryBackend {
    /// Creates a new in-memory backend with [`DEFAULT_LOCK_TIMEOUT`].
    ///
    /// Must be called from within a Tokio runtime: it spawns the expiry
    /// cleanup task.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new in-memory backend whose row-lock waits give up after
    /// `lock_timeout` with [`StorageError::Timeout`].
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let data: Shared = Arc::new(RwLock::new(BTreeMap::new()));

        // The task owns only the data map; holding the guard would keep the
        // channel open forever.
        tokio::spawn(cleanup_expired_keys(Arc::clone(&data), shutdown_rx));

        Self {
            data,
            row_locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        }
    }

    /// Signals the background cleanup task to stop. Idempotent.
    ///
    /// Reads keep honouring expiry after shutdown; only reclamation stops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Number of live keys. Intended for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|entry| entry.is_live(now)).count()
    }

    /// Returns `true` if no live keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_handle(&self, key: &[u8]) -> Arc<AsyncMutex<()>> {
        let mut table = self.row_locks.lock();
        Arc::clone(table.entry(key.to_vec()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    /// Drops lock-table entries nobody holds or waits on.
    fn prune_row_locks<'a>(&self, keys: impl Iterator<Item = &'a Vec<u8>>) {
        let mut table = self.row_locks.lock();
        for key in keys {
            if table.get(key).is_some_and(|handle| Arc::strong_count(handle) == 1) {
                table.remove(key);
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn cleanup_expired_keys(data: Shared, mut shutdown_rx: watch::Receiver<()>) {
    loop {
        select! {
            _ = sleep(CLEANUP_INTERVAL) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let now = Instant::now();
        let mut guard = data.write();
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live(now));
        let removed = before - guard.len();
        if removed > 0 {
            trace!(removed, "reclaimed expired keys");
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        Ok(live_value(&self.data.read(), key, Instant::now()))
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.data.write().insert(key, Entry::persistent(value));
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        let mut data = self.data.write();
        let current = live_value(&data, key, Instant::now());

        let matches = match (expected, &current) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur[..],
            _ => false,
        };

        if !matches {
            return Err(StorageError::Conflict);
        }

        data.insert(key.to_vec(), Entry::persistent(new_value));
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let start = match range.start_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let end = match range.end_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let now = Instant::now();
        let data = self.data.read();
        Ok(data
            .range::<[u8], _>((start, end))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(k, entry)| KeyValue::new(Bytes::copy_from_slice(k), entry.value.clone()))
            .collect())
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let entry = Entry { value: Bytes::from(value), expires_at: Some(expiry(Instant::now(), ttl)?) };
        self.data.write().insert(key, entry);
        Ok(())
    }

    async fn increment_with_ttl(&self, key: Vec<u8>, ttl: Duration) -> StorageResult<Counter> {
        let now = Instant::now();
        let mut data = self.data.write();

        if let Some(entry) = data.get_mut(&key)
            && entry.is_live(now)
        {
            let current: u64 = std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| StorageError::serialization("value is not a counter"))?;
            let count = current.saturating_add(1);
            entry.value = Bytes::from(count.to_string());
            let expires_in =
                entry.expires_at.map_or(Duration::MAX, |at| at.saturating_duration_since(now));
            return Ok(Counter { count, expires_in });
        }

        let expires_at = expiry(now, ttl)?;
        data.insert(key, Entry { value: Bytes::from_static(b"1"), expires_at: Some(expires_at) });
        Ok(Counter { count: 1, expires_in: ttl })
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    async fn health_check(&self) -> StorageResult<()> {
        let _unused = self.data.read();
        Ok(())
    }
}

/// A compare-and-set operation to be verified at commit time.
#[derive(Debug, Clone)]
struct CasOperation {
    key: Vec<u8>,
    expected: Option<Vec<u8>>,
    new_value: Vec<u8>,
}

/// In-memory transaction.
///
/// Buffers writes until commit and holds the row locks taken by
/// `get_for_update` until it is committed or dropped.
struct MemoryTransaction {
    backend: MemoryBackend,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    pending_cas: Vec<CasOperation>,
    held_locks: HashMap<Vec<u8>, OwnedMutexGuard<()>>,
}

impl MemoryTransaction {
    fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            pending_writes: BTreeMap::new(),
            pending_cas: Vec::new(),
            held_locks: HashMap::new(),
        }
    }

    fn read(&self, key: &[u8]) -> Option<Bytes> {
        if let Some(value) = self.pending_writes.get(key) {
            return value.as_ref().map(|v| Bytes::copy_from_slice(v));
        }
        live_value(&self.backend.data.read(), key, Instant::now())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.held_locks.is_empty() {
            return;
        }
        let keys: Vec<Vec<u8>> = self.held_locks.drain().map(|(key, _guard)| key).collect();
        self.backend.prune_row_locks(keys.iter());
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        Ok(self.read(key))
    }

    async fn get_for_update(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if !self.held_locks.contains_key(key) {
            let handle = self.backend.lock_handle(key);
            let acquired = tokio::time::timeout(self.backend.lock_timeout, handle.lock_owned()).await;
            let Ok(guard) = acquired else {
                debug!(timeout = ?self.backend.lock_timeout, "row lock wait timed out");
                self.backend.prune_row_locks(std::iter::once(&key.to_vec()));
                return Err(StorageError::timeout());
            };
            self.held_locks.insert(key.to_vec(), guard);
        }
        Ok(self.read(key))
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.pending_writes.insert(key, None);
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.pending_cas.push(CasOperation { key, expected, new_value });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let pending_cas = std::mem::take(&mut self.pending_cas);
        let pending_writes = std::mem::take(&mut self.pending_writes);

        {
            let now = Instant::now();
            let mut data = self.backend.data.write();

            for cas in &pending_cas {
                let current = live_value(&data, &cas.key, now);
                let matches = match (&cas.expected, &current) {
                    (None, None) => true,
                    (Some(expected_bytes), Some(current_bytes)) => {
                        expected_bytes.as_slice() == &current_bytes[..]
                    },
                    _ => false,
                };

                if !matches {
                    return Err(StorageError::Conflict);
                }
            }

            for cas in pending_cas {
                data.insert(cas.key, Entry::persistent(cas.new_value));
            }

            for (key, value) in pending_writes {
                match value {
                    Some(v) => {
                        data.insert(key, Entry::persistent(v));
                    },
                    None => {
                        data.remove(&key);
                    },
                }
            }
        }

        // Row locks are released when `self` drops here.
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let backend = MemoryBackend::new();

        backend.set(b"key1".to_vec(), b"value1".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"key1").await.unwrap(), Some(Bytes::from("value1")));

        backend.delete(b"key1").await.unwrap();
        assert_eq!(backend.get(b"key1").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_range_operations() {
        let backend = MemoryBackend::new();

        backend.set(b"refresh/subject/1/10".to_vec(), vec![]).await.unwrap();
        backend.set(b"refresh/subject/1/11".to_vec(), vec![]).await.unwrap();
        backend.set(b"refresh/subject/2/12".to_vec(), vec![]).await.unwrap();

        let range = backend
            .get_range(b"refresh/subject/1/".to_vec()..b"refresh/subject/10".to_vec())
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].key, Bytes::from("refresh/subject/1/10"));
        assert_eq!(range[1].key, Bytes::from("refresh/subject/1/11"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_is_exact() {
        let backend = MemoryBackend::new();
        backend.set_with_ttl(b"temp".to_vec(), b"value".to_vec(), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(backend.get(b"temp").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(backend.get(b"temp").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_clears_ttl() {
        let backend = MemoryBackend::new();
        backend.set_with_ttl(b"key".to_vec(), b"v1".to_vec(), Duration::from_secs(1)).await.unwrap();
        backend.set(b"key".to_vec(), b"v2".to_vec()).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let backend = MemoryBackend::new();

        backend.compare_and_set(b"key", None, b"first".to_vec()).await.unwrap();
        let err = backend.compare_and_set(b"key", None, b"second".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("first")));
    }

    #[tokio::test]
    async fn test_compare_and_set_requires_exact_match() {
        let backend = MemoryBackend::new();
        backend.set(b"key".to_vec(), b"v1".to_vec()).await.unwrap();

        let err = backend.compare_and_set(b"key", Some(b"v0"), b"v2".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        backend.compare_and_set(b"key", Some(b"v1"), b"v2".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("v2")));

        let err = backend.compare_and_set(b"missing", Some(b"v1"), b"v2".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_set_treats_expired_as_absent() {
        let backend = MemoryBackend::new();
        backend.set_with_ttl(b"key".to_vec(), b"old".to_vec(), Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        backend.compare_and_set(b"key", None, b"new".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_with_ttl_keeps_window_start() {
        let backend = MemoryBackend::new();
        let window = Duration::from_secs(60);

        let first = backend.increment_with_ttl(b"hits".to_vec(), window).await.unwrap();
        assert_eq!(first, Counter { count: 1, expires_in: window });

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = backend.increment_with_ttl(b"hits".to_vec(), window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.expires_in, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        let reset = backend.increment_with_ttl(b"hits".to_vec(), window).await.unwrap();
        assert_eq!(reset, Counter { count: 1, expires_in: window });
    }

    #[tokio::test]
    async fn test_increment_rejects_non_counter_value() {
        let backend = MemoryBackend::new();
        backend.set(b"hits".to_vec(), b"not-a-number".to_vec()).await.unwrap();

        let err = backend
            .increment_with_ttl(b"hits".to_vec(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_counted_once_each() {
        let backend = MemoryBackend::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                backend.increment_with_ttl(b"hits".to_vec(), Duration::from_secs(60)).await.unwrap().count
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_transaction_read_your_writes_and_commit() {
        let backend = MemoryBackend::new();

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"key1".to_vec(), b"value1".to_vec());
        txn.set(b"key2".to_vec(), b"value2".to_vec());
        assert_eq!(txn.get(b"key1").await.unwrap(), Some(Bytes::from("value1")));
        assert_eq!(backend.get(b"key1").await.unwrap(), None);

        txn.commit().await.unwrap();
        assert_eq!(backend.get(b"key2").await.unwrap(), Some(Bytes::from("value2")));
    }

    #[tokio::test]
    async fn test_transaction_conflict_applies_nothing() {
        let backend = MemoryBackend::new();
        backend.set(b"taken".to_vec(), b"x".to_vec()).await.unwrap();

        let mut txn = backend.transaction().await.unwrap();
        txn.set(b"other".to_vec(), b"y".to_vec());
        txn.compare_and_set(b"taken".to_vec(), None, b"z".to_vec()).unwrap();

        assert!(matches!(txn.commit().await, Err(StorageError::Conflict)));
        assert_eq!(backend.get(b"other").await.unwrap(), None);
        assert_eq!(backend.get(b"taken").await.unwrap(), Some(Bytes::from("x")));
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let backend = MemoryBackend::new();
        {
            let mut txn = backend.transaction().await.unwrap();
            txn.set(b"key".to_vec(), b"value".to_vec());
        }
        assert_eq!(backend.get(b"key").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_for_update_serializes_same_key() {
        let backend = MemoryBackend::new();
        backend.set(b"row".to_vec(), b"0".to_vec()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let mut txn = backend.transaction().await.unwrap();
                let current = txn.get_for_update(b"row").await.unwrap().unwrap();
                let n: u64 = std::str::from_utf8(&current).unwrap().parse().unwrap();
                tokio::task::yield_now().await;
                txn.compare_and_set(b"row".to_vec(), Some(current.to_vec()), (n + 1).to_string().into_bytes())
                    .unwrap();
                txn.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(backend.get(b"row").await.unwrap(), Some(Bytes::from("20")));
        assert!(backend.row_locks.lock().is_empty(), "lock table should be pruned");
    }

    #[tokio::test]
    async fn test_get_for_update_is_reentrant_within_transaction() {
        let backend = MemoryBackend::new();
        backend.set(b"row".to_vec(), b"v".to_vec()).await.unwrap();

        let mut txn = backend.transaction().await.unwrap();
        txn.get_for_update(b"row").await.unwrap();
        assert_eq!(txn.get_for_update(b"row").await.unwrap(), Some(Bytes::from("v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_for_update_times_out_while_held() {
        let backend = MemoryBackend::with_lock_timeout(Duration::from_millis(100));

        let mut holder = backend.transaction().await.unwrap();
        holder.get_for_update(b"row").await.unwrap();

        let mut waiter = backend.transaction().await.unwrap();
        let err = waiter.get_for_update(b"row").await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout));

        drop(holder);
        assert_eq!(waiter.get_for_update(b"row").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_row_locks_do_not_block_other_keys() {
        let backend = MemoryBackend::with_lock_timeout(Duration::from_millis(200));

        let mut first = backend.transaction().await.unwrap();
        first.get_for_update(b"a").await.unwrap();

        let mut second = backend.transaction().await.unwrap();
        second.get_for_update(b"b").await.unwrap();
        assert_eq!(backend.row_locks.lock().len(), 2);

        drop(first);
        drop(second);
        assert!(backend.row_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.shutdown();
        backend.shutdown();

        backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("value")));
    }

    #[tokio::test]
    async fn test_clone_shares_data() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
        assert_eq!(clone.get(b"key").await.unwrap(), Some(Bytes::from("value")));
        assert_eq!(clone.len(), 1);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn range_matches_btreemap_semantics(
                keys in proptest::collection::btree_set(proptest::collection::vec(any::<u8>(), 1..8), 0..20),
                lo in proptest::collection::vec(any::<u8>(), 1..8),
                hi in proptest::collection::vec(any::<u8>(), 1..8),
            ) {
                prop_assume!(lo <= hi);
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                rt.block_on(async {
                    let backend = MemoryBackend::new();
                    for key in &keys {
                        backend.set(key.clone(), key.clone()).await.unwrap();
                    }
                    let got: Vec<Vec<u8>> = backend
                        .get_range(lo.clone()..hi.clone())
                        .await
                        .unwrap()
                        .into_iter()
                        .map(|kv| kv.key.to_vec())
                        .collect();
                    let expected: Vec<Vec<u8>> = keys.range(lo.clone()..hi.clone()).cloned().collect();
                    prop_assert_eq!(got, expected);
                    Ok(())
                })?;
            }
        }
    }
}
