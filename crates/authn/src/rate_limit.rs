//! Fixed-window rate limiting over the shared counter store.
//!
//! Each `(action, principal)` pair owns one counter at
//! `ratelimit/{action}/{principal}`. The first hit in a window creates the
//! counter with a TTL equal to the window; later hits increment it without
//! touching the TTL. Both steps are a single atomic
//! [`StorageBackend::increment_with_ttl`] call, so concurrent requests never
//! lose an update.
//!
//! # Fail-open
//!
//! If the counter store fails or does not answer within the configured
//! timeout, the request is **allowed** with
//! [`degraded`](RateLimitDecision::degraded) set, a warning is logged and
//! the degraded counter in [`RateLimitMetricsSnapshot`] increments. Sign-in
//! stays available during a counter-store outage at the cost of losing
//! throttling for its duration.
//!
//! # Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use taskhub_authn::{FixedWindowLimiter, RateLimitAction, RateLimitConfig};
//! use taskhub_storage::MemoryBackend;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let limiter = FixedWindowLimiter::new(
//!     Arc::new(MemoryBackend::new()),
//!     RateLimitConfig::default(),
//!     Duration::from_secs(2),
//! );
//!
//! let decision = limiter.check(RateLimitAction::SignIn, "alice@example.com").await;
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 4);
//! # });
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use taskhub_storage::StorageBackend;

use crate::{
    config::{RateLimitConfig, RateLimitPolicy},
    error::AuthError,
};

/// Actions with their own rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    /// Credential sign-in.
    SignIn,
    /// Refresh rotation.
    Rotate,
    /// Social-provider exchange.
    SocialExchange,
}

impl RateLimitAction {
    /// Every action.
    pub const ALL: [RateLimitAction; 3] = [Self::SignIn, Self::Rotate, Self::SocialExchange];

    /// Key segment of this action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::Rotate => "rotate",
            Self::SocialExchange => "social_exchange",
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter key for an action and principal.
#[must_use]
pub fn rate_limit_key(action: RateLimitAction, principal: &str) -> String {
    format!("ratelimit/{action}/{principal}")
}

/// Outcome of one rate-limited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed.
    pub allowed: bool,
    /// Attempts allowed per window.
    pub limit: u64,
    /// Attempts left in the current window.
    pub remaining: u64,
    /// Time until the current window resets.
    pub reset_after: Duration,
    /// The counter store was unavailable and the attempt was let through
    /// unchecked.
    pub degraded: bool,
}

/// Counters kept by the limiter.
#[derive(Debug, Default)]
struct LimiterMetrics {
    allowed: AtomicU64,
    rejected: AtomicU64,
    degraded: AtomicU64,
}

/// Snapshot of limiter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitMetricsSnapshot {
    /// Attempts allowed, including degraded ones.
    pub allowed: u64,
    /// Attempts rejected.
    pub rejected: u64,
    /// Attempts allowed because the counter store failed.
    pub degraded: u64,
}

/// Fixed-window limiter backed by a [`StorageBackend`].
pub struct FixedWindowLimiter<B> {
    backend: Arc<B>,
    policies: RateLimitConfig,
    store_timeout: Duration,
    metrics: LimiterMetrics,
}

impl<B> fmt::Debug for FixedWindowLimiter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("policies", &self.policies)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> FixedWindowLimiter<B> {
    /// Creates a limiter with per-action `policies`. Counter-store calls
    /// taking longer than `store_timeout` fail open.
    pub fn new(backend: Arc<B>, policies: RateLimitConfig, store_timeout: Duration) -> Self {
        Self { backend, policies, store_timeout, metrics: LimiterMetrics::default() }
    }

    /// Counts one attempt against `key`.
    ///
    /// A policy with an empty window or a zero quota admits nothing; such
    /// attempts are denied without touching the counter store.
    #[tracing::instrument(skip(self))]
    pub async fn consume(&self, key: &str, window: Duration, max_count: u64) -> RateLimitDecision {
        if window.is_zero() || max_count == 0 {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "empty rate-limit policy, denying");
            return RateLimitDecision {
                allowed: false,
                limit: max_count,
                remaining: 0,
                reset_after: window,
                degraded: false,
            };
        }

        let increment = self.backend.increment_with_ttl(key.as_bytes().to_vec(), window);
        let counter = match tokio::time::timeout(self.store_timeout, increment).await {
            Ok(Ok(counter)) => counter,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "rate-limit store failed, allowing request");
                return self.degraded(window, max_count);
            },
            Err(_elapsed) => {
                tracing::warn!(key, "rate-limit store timed out, allowing request");
                return self.degraded(window, max_count);
            },
        };

        let allowed = counter.count <= max_count;
        if allowed {
            self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, count = counter.count, "rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            limit: max_count,
            remaining: max_count.saturating_sub(counter.count),
            reset_after: counter.expires_in,
            degraded: false,
        }
    }

    /// Counts one attempt of `action` by `principal` under the configured
    /// policy.
    pub async fn check(&self, action: RateLimitAction, principal: &str) -> RateLimitDecision {
        let RateLimitPolicy { max_count, window } = self.policies.policy(action);
        self.consume(&rate_limit_key(action, principal), window, max_count).await
    }

    /// Like [`check`](Self::check), but turns a denial into an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] carrying the time until the window
    /// resets.
    pub async fn enforce(&self, action: RateLimitAction, principal: &str) -> Result<RateLimitDecision, AuthError> {
        let decision = self.check(action, principal).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(AuthError::rate_limited(decision.reset_after))
        }
    }

    /// Policy applied to `action`.
    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        self.policies.policy(action)
    }

    /// Returns the current counters.
    #[must_use]
    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            degraded: self.metrics.degraded.load(Ordering::Relaxed),
        }
    }

    fn degraded(&self, window: Duration, max_count: u64) -> RateLimitDecision {
        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        self.metrics.degraded.fetch_add(1, Ordering::Relaxed);
        RateLimitDecision { allowed: true, limit: max_count, remaining: max_count, reset_after: window, degraded: true }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use taskhub_storage::{MemoryBackend, testutil::FaultyBackend};

    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> FixedWindowLimiter<MemoryBackend> {
        FixedWindowLimiter::new(Arc::new(MemoryBackend::new()), RateLimitConfig::default(), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_allows_max_then_denies() {
        let limiter = limiter();
        for expected_remaining in (0..5).rev() {
            let decision = limiter.consume("k", WINDOW, 5).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.consume("k", WINDOW, 5).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_after, WINDOW);

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = limiter.consume("k", WINDOW, 5).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);

        let snapshot = limiter.metrics_snapshot();
        assert_eq!(snapshot, RateLimitMetricsSnapshot { allowed: 6, rejected: 1, degraded: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_policy_denies_without_counting() {
        let limiter = limiter();
        for _ in 0..3 {
            let decision = limiter.consume("zero-window", Duration::ZERO, 5).await;
            assert!(!decision.allowed);
            assert_eq!(decision.remaining, 0);
        }
        assert!(!limiter.consume("zero-quota", WINDOW, 0).await.allowed);

        assert_eq!(limiter.backend.len(), 0, "no counter may be created");
        assert_eq!(limiter.metrics_snapshot(), RateLimitMetricsSnapshot { allowed: 0, rejected: 4, degraded: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_counts_down() {
        let limiter = limiter();
        limiter.consume("k", WINDOW, 5).await;
        tokio::time::advance(Duration::from_secs(20)).await;
        let decision = limiter.consume("k", WINDOW, 5).await;
        assert_eq!(decision.reset_after, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_principals_are_independent() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check(RateLimitAction::SignIn, "a").await;
        }
        assert!(limiter.enforce(RateLimitAction::SignIn, "a").await.is_err());
        assert!(limiter.enforce(RateLimitAction::SignIn, "b").await.is_ok());
        assert!(limiter.enforce(RateLimitAction::Rotate, "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_enforce_reports_retry_after() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.enforce(RateLimitAction::SignIn, "p").await.unwrap();
        }
        match limiter.enforce(RateLimitAction::SignIn, "p").await {
            Err(AuthError::RateLimited { retry_after }) => assert!(retry_after <= WINDOW),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let backend = Arc::new(FaultyBackend::new(MemoryBackend::new()));
        backend.set_unavailable(true);
        let limiter = FixedWindowLimiter::new(backend, RateLimitConfig::default(), Duration::from_secs(1));

        for _ in 0..10 {
            let decision = limiter.check(RateLimitAction::SignIn, "p").await;
            assert!(decision.allowed);
            assert!(decision.degraded);
        }
        assert_eq!(limiter.metrics_snapshot().degraded, 10);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(rate_limit_key(RateLimitAction::SocialExchange, "x"), "ratelimit/social_exchange/x");
    }
}
