//! # Taskhub Authentication
//!
//! The authentication and session core of the Taskhub collaboration API.
//!
//! This crate provides:
//! - **Credential codec**: EdDSA-signed access and refresh credentials,
//!   each kind under its own key
//! - **Rotation protocol**: exactly-once exchange of refresh credentials
//!   against the [`RevocationLedger`](taskhub_storage::ledger::RevocationLedger)
//! - **Rate limiting**: fixed-window counters over a shared store, failing
//!   open when the store is down
//! - **Authorization gate**: workspace membership checks with an optional
//!   admin bypass
//! - **Transport helpers**: session cookies, `RateLimit-*` headers and
//!   error bodies
//!
//! User management, the workspace schema and social-identity providers are
//! external collaborators, reached through [`IdentityStore`] and
//! [`MembershipStore`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use taskhub_authn::{
//!     AuthConfig, CredentialCodec, SessionService, SystemClock,
//!     identity::{Identity, InMemoryIdentityStore},
//!     keys::SigningSecrets,
//! };
//! use taskhub_storage::{MemoryBackend, SubjectId, ledger::RevocationLedger};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = AuthConfig::default();
//! let codec = CredentialCodec::new(
//!     Arc::new(SigningSecrets::generate()),
//!     Arc::new(SystemClock),
//!     &config,
//! ).unwrap();
//!
//! let identities = InMemoryIdentityStore::new();
//! identities.insert(Identity::builder().id(SubjectId(7)).email("ada@example.com").build());
//!
//! let ledger = RevocationLedger::new(Arc::new(MemoryBackend::new()));
//! let sessions = SessionService::new(codec, ledger, Arc::new(identities), config);
//!
//! let first = sessions.sign_in(SubjectId(7)).await.unwrap();
//! let second = sessions.rotate(&first.refresh.token).await.unwrap();
//!
//! // A refresh credential can be exchanged only once.
//! assert!(sessions.rotate(&first.refresh.token).await.is_err());
//! assert!(sessions.rotate(&second.refresh.token).await.is_ok());
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: manual clock, test harness, token-crafting helpers and
//!   [`assert_auth_error!`]
//! - **`failpoints`**: activates `fail` points inside the rotation protocol

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Workspace authorization gate.
pub mod authz;
/// Wall-clock abstraction.
pub mod clock;
/// Credential issuance and verification.
pub mod codec;
/// Configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Identities and the user-management collaborator.
pub mod identity;
/// Ed25519 signing secrets.
pub mod keys;
/// Fixed-window rate limiting.
pub mod rate_limit;
/// Sign-in, rotation and sign-out.
pub mod session;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
/// Cookies, rate-limit headers and error bodies.
pub mod transport;
/// JWT header validation.
pub mod validation;

pub use authz::{Authorization, AuthorizationGate, AuthorizeOptions, MembershipStore, WorkspaceRole};
pub use clock::{Clock, SystemClock};
pub use codec::{CredentialCodec, CredentialKind, IssuedCredential, VerifiedCredential, hash_credential};
pub use config::{AuthConfig, MAX_CREDENTIAL_LIFETIME, RateLimitConfig, RateLimitPolicy};
pub use error::{AuthError, Result};
pub use identity::{Identity, IdentityStore, Role};
pub use rate_limit::{FixedWindowLimiter, RateLimitAction, RateLimitDecision, RateLimitMetricsSnapshot};
pub use session::{IssuedSession, SessionService, SignOut};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
