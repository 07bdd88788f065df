//! TTL boundary condition tests for `MemoryBackend`.
//!
//! Covers the expiry edge cases the rate limiter and ledger depend on: zero
//! TTL, TTLs too large for the clock, exact expiration instants, counters
//! rolling over into a new window, and TTL clearing via `set`.
//!
//! All tests run on a paused clock so boundaries are exact.

#![allow(clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bytes::Bytes;
use taskhub_storage::{MemoryBackend, StorageBackend, StorageError, assert_storage_error};

// ============================================================================
// Zero and oversized TTL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_zero_ttl_is_immediately_expired() {
    let backend = MemoryBackend::new();
    backend.set_with_ttl(b"zero".to_vec(), b"v".to_vec(), Duration::ZERO).await.expect("set");

    assert_eq!(backend.get(b"zero").await.expect("get"), None);
    assert!(backend.get_range(b"a".to_vec()..b"z".to_vec()).await.expect("range").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_window_counter_never_accumulates() {
    let backend = MemoryBackend::new();
    for _ in 0..3 {
        let counter = backend.increment_with_ttl(b"hits".to_vec(), Duration::ZERO).await.expect("incr");
        assert_eq!(counter.count, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_large_ttl_is_readable() {
    let backend = MemoryBackend::new();
    let hundred_years = Duration::from_secs(100 * 365 * 24 * 3600);
    backend.set_with_ttl(b"long".to_vec(), b"v".to_vec(), hundred_years).await.expect("set");

    assert_eq!(backend.get(b"long").await.expect("get"), Some(Bytes::from("v")));
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_ttl_is_an_error() {
    let backend = MemoryBackend::new();

    let result = backend.set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::MAX).await;
    assert_storage_error!(result, StorageError::Internal { .. });
    let result = backend.increment_with_ttl(b"c".to_vec(), Duration::MAX).await;
    assert_storage_error!(result, StorageError::Internal { .. });

    assert!(backend.is_empty());
}

// ============================================================================
// Exact boundaries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_expiry_boundary_before_and_at() {
    let backend = MemoryBackend::new();
    backend.set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::from_secs(60)).await.expect("set");

    tokio::time::advance(Duration::from_millis(59_999)).await;
    assert!(backend.get(b"k").await.expect("get").is_some(), "live one millisecond before expiry");

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(backend.get(b"k").await.expect("get").is_none(), "expired exactly at the boundary");
}

#[tokio::test(start_paused = true)]
async fn test_counter_rolls_into_new_window_at_boundary() {
    let backend = MemoryBackend::new();
    let window = Duration::from_secs(60);

    for expected in 1..=3 {
        let counter = backend.increment_with_ttl(b"hits".to_vec(), window).await.expect("incr");
        assert_eq!(counter.count, expected);
    }

    tokio::time::advance(Duration::from_secs(59)).await;
    let last = backend.increment_with_ttl(b"hits".to_vec(), window).await.expect("incr");
    assert_eq!(last.count, 4);
    assert_eq!(last.expires_in, Duration::from_secs(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    let fresh = backend.increment_with_ttl(b"hits".to_vec(), window).await.expect("incr");
    assert_eq!(fresh.count, 1);
    assert_eq!(fresh.expires_in, window);
}

#[tokio::test(start_paused = true)]
async fn test_independent_expirations() {
    let backend = MemoryBackend::new();
    backend.set_with_ttl(b"short".to_vec(), b"1".to_vec(), Duration::from_secs(1)).await.expect("set");
    backend.set_with_ttl(b"long".to_vec(), b"2".to_vec(), Duration::from_secs(10)).await.expect("set");
    backend.set(b"forever".to_vec(), b"3".to_vec()).await.expect("set");

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(backend.get(b"short").await.expect("get").is_none());
    assert!(backend.get(b"long").await.expect("get").is_some());
    assert_eq!(backend.len(), 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(backend.len(), 1);
}

// ============================================================================
// TTL clearing and replacement
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_set_after_set_with_ttl_clears_expiration() {
    let backend = MemoryBackend::new();
    backend.set_with_ttl(b"k".to_vec(), b"v1".to_vec(), Duration::from_secs(1)).await.expect("set");
    backend.set(b"k".to_vec(), b"v2".to_vec()).await.expect("set");

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(backend.get(b"k").await.expect("get"), Some(Bytes::from("v2")));
}

#[tokio::test(start_paused = true)]
async fn test_ttl_replacement_shortens_expiration() {
    let backend = MemoryBackend::new();
    backend.set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::from_secs(60)).await.expect("set");
    backend.set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::from_secs(5)).await.expect("set");

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(backend.get(b"k").await.expect("get").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expired_counter_key_accepts_new_value() {
    let backend = MemoryBackend::new();
    backend.increment_with_ttl(b"hits".to_vec(), Duration::from_secs(1)).await.expect("incr");

    tokio::time::advance(Duration::from_secs(1)).await;
    backend.compare_and_set(b"hits", None, b"reset".to_vec()).await.expect("expired key counts as absent");
    assert_eq!(backend.get(b"hits").await.expect("get"), Some(Bytes::from("reset")));
}
