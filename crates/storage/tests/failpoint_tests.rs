#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the retry loop.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p taskhub-storage --features failpoints --test failpoint_tests
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use taskhub_storage::{RetryConfig, StorageError, StorageResult, with_retry};

fn config() -> RetryConfig {
    RetryConfig::builder()
        .max_retries(1)
        .initial_backoff(Duration::from_millis(1))
        .max_backoff(Duration::from_millis(1))
        .build()
}

#[tokio::test]
async fn retry_before_sleep_failpoint_fires_only_on_transient_errors() {
    let scenario = fail::FailScenario::setup();
    let hits = Arc::new(AtomicU32::new(0));
    let observed = Arc::clone(&hits);
    fail::cfg_callback("retry-before-sleep", move || {
        observed.fetch_add(1, Ordering::SeqCst);
    })
    .expect("failed to configure fail point");

    let _: StorageResult<()> = with_retry(&config(), "conflict", || async { Err(StorageError::conflict()) }).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0, "definitive errors never reach backoff");

    let _: StorageResult<()> =
        with_retry(&config(), "outage", || async { Err(StorageError::connection("down")) }).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1, "one retry means one backoff");

    scenario.teardown();
}
