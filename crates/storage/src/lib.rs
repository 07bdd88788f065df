//! Storage layer for the Taskhub session core.
//!
//! This crate provides the [`StorageBackend`] trait that the session core is
//! written against, an in-memory implementation, and the refresh-credential
//! [`RevocationLedger`](ledger::RevocationLedger) built on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 taskhub-authn (session core)                │
//! │   SessionService │ FixedWindowLimiter │ AuthorizationGate   │
//! ├─────────────────────────────────────────────────────────────┤
//! │   ledger::RevocationLedger   │   increment_with_ttl         │
//! │   (records, row locks)       │   (rate-limit counters)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  StorageBackend + Transaction               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 MemoryBackend (tests, single node)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use taskhub_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//!
//! backend.set(b"user:123".to_vec(), b"Alice".to_vec()).await.unwrap();
//! let value = backend.get(b"user:123").await.unwrap();
//! assert_eq!(value.map(|b| b.to_vec()), Some(b"Alice".to_vec()));
//!
//! let mut txn = backend.transaction().await.unwrap();
//! txn.set(b"a".to_vec(), b"1".to_vec());
//! txn.set(b"b".to_vec(), b"2".to_vec());
//! txn.commit().await.unwrap();
//! # });
//! ```
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait, including the atomic
//!    [`increment_with_ttl`](StorageBackend::increment_with_ttl)
//! 2. Implement a [`Transaction`] with per-key
//!    [`get_for_update`](Transaction::get_for_update) locks
//! 3. Map backend-specific errors to [`StorageError`], marking retryable
//!    ones as connection or timeout failures
//!
//! # Feature Flags
//!
//! - **`testutil`**: fault-injecting backend wrapper and assertion macros
//! - **`failpoints`**: activates `fail` points in the retry loop

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod retry;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod transaction;
pub mod types;

pub use backend::StorageBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use ledger::{RecordState, RevokeOutcome};
pub use memory::{DEFAULT_LOCK_TIMEOUT, MemoryBackend};
pub use retry::{RetryConfig, RetryableError, with_retry, with_retry_timeout};
pub use transaction::Transaction;
pub use types::{Counter, KeyValue, RecordId, SubjectId, WorkspaceId};
