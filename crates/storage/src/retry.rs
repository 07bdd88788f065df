//! Retry logic for transient storage failures.
//!
//! [`with_retry`] wraps an async operation with automatic retry on transient
//! errors (connection failures, timeouts). Definitive errors (conflict,
//! serialization, not-found) are returned immediately.
//!
//! [`with_retry_timeout`] additionally bounds the total wall-clock time,
//! including backoff sleeps.
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Errors that can tell whether retrying might help.
pub trait RetryableError: std::fmt::Display {
    /// Returns `true` if the same operation may succeed when retried.
    fn is_transient(&self) -> bool;
}

impl RetryableError for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

/// Serializable retry policy.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskhub_storage::RetryConfig;
///
/// let config: RetryConfig = serde_json::from_str(r#"{"initial_backoff": "20ms"}"#).unwrap();
/// assert_eq!(config.max_retries, 1);
/// assert_eq!(config.initial_backoff, Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    #[serde(default = "default_max_retries")]
    #[builder(default = default_max_retries())]
    pub max_retries: u32,

    /// Backoff before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    #[builder(default = default_initial_backoff())]
    pub initial_backoff: Duration,

    /// Upper bound on a single backoff (before jitter).
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    #[builder(default = default_max_backoff())]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    1
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(50)
}

fn default_max_backoff() -> Duration {
    Duration::from_millis(500)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// Executes `operation`, retrying transient failures per `config`.
///
/// Returns the first success, the first definitive error, or the last
/// transient error once retries are exhausted.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                fail_point!("retry-before-sleep");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => {
                if attempt > 0 && err.is_transient() {
                    tracing::warn!(operation = operation_name, error = %err, "retries exhausted");
                }
                return Err(err);
            },
        }
    }
}

/// Executes `operation` with retry **and** an overall timeout.
///
/// When `timeout` elapses the in-flight attempt is dropped (rolling back
/// any open transaction) and [`StorageError::Timeout`] is returned,
/// converted into the caller's error type.
#[tracing::instrument(
    skip(config, operation),
    fields(timeout_ms = timeout.as_millis() as u64, max_retries = config.max_retries)
)]
pub async fn with_retry_timeout<F, Fut, T, E>(
    config: &RetryConfig,
    timeout: Duration,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + From<StorageError>,
{
    match tokio::time::timeout(timeout, with_retry(config, operation_name, operation)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::warn!(operation = operation_name, "operation timed out");
            Err(StorageError::timeout().into())
        },
    }
}

/// Computes the backoff duration for the given attempt number.
///
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
