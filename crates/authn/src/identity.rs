//! Identity records and the user-management collaborator.
//!
//! The session core never creates or mutates identities. It reads them
//! through [`IdentityStore`], which the user-management subsystem
//! implements. [`InMemoryIdentityStore`] is a complete implementation for
//! tests and single-node deployments.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taskhub_storage::SubjectId;

use crate::error::AuthError;

/// Global role of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary user.
    Member,
    /// Elevated role; may bypass workspace membership where allowed.
    Admin,
}

/// Account status of an identity. Only [`Active`](Self::Active) identities
/// can sign in, rotate or pass the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    /// Usable.
    Active,
    /// Temporarily blocked.
    Suspended,
    /// Permanently closed.
    Deactivated,
}

/// An identity as seen by the session core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Identity {
    /// Identity id; the `sub` claim of every credential.
    pub id: SubjectId,
    /// Primary email address.
    #[builder(into)]
    pub email: String,
    /// Global role.
    #[builder(default = Role::Member)]
    pub role: Role,
    /// Account status.
    #[builder(default = IdentityStatus::Active)]
    pub status: IdentityStatus,
}

impl Identity {
    /// Returns `true` if the identity may use the system.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// Projection returned to clients.
    #[must_use]
    pub fn profile(&self) -> PublicProfile {
        PublicProfile { id: self.id, email: self.email.clone(), role: self.role }
    }
}

/// Client-facing view of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// Identity id.
    pub id: SubjectId,
    /// Email address.
    pub email: String,
    /// Global role.
    pub role: Role,
}

/// Identity proven by a social-identity provider.
///
/// The provider exchange itself happens outside the session core; this is
/// its verified result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAssertion {
    /// Provider name, e.g. `"github"`.
    pub provider: String,
    /// Subject id at the provider.
    pub external_subject: String,
    /// Email the provider vouches for.
    pub email: String,
}

/// Read access to identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Loads an identity by id.
    async fn find_identity(&self, id: SubjectId) -> Result<Option<Identity>, AuthError>;

    /// Resolves a provider identity to a local one.
    async fn find_by_external(
        &self,
        provider: &str,
        external_subject: &str,
    ) -> Result<Option<Identity>, AuthError>;
}

#[derive(Debug, Default)]
struct Directory {
    identities: HashMap<SubjectId, Identity>,
    external: HashMap<(String, String), SubjectId>,
}

/// In-memory [`IdentityStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityStore {
    inner: Arc<RwLock<Directory>>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an identity.
    pub fn insert(&self, identity: Identity) {
        self.inner.write().identities.insert(identity.id, identity);
    }

    /// Links a provider identity to a local identity.
    pub fn link_external(&self, provider: &str, external_subject: &str, id: SubjectId) {
        self.inner.write().external.insert((provider.to_owned(), external_subject.to_owned()), id);
    }

    /// Changes the status of an identity. Returns `false` if it is unknown.
    pub fn set_status(&self, id: SubjectId, status: IdentityStatus) -> bool {
        match self.inner.write().identities.get_mut(&id) {
            Some(identity) => {
                identity.status = status;
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_identity(&self, id: SubjectId) -> Result<Option<Identity>, AuthError> {
        Ok(self.inner.read().identities.get(&id).cloned())
    }

    async fn find_by_external(
        &self,
        provider: &str,
        external_subject: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let directory = self.inner.read();
        let id = directory.external.get(&(provider.to_owned(), external_subject.to_owned()));
        Ok(id.and_then(|id| directory.identities.get(id)).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_and_status_change() {
        let store = InMemoryIdentityStore::new();
        store.insert(Identity::builder().id(SubjectId(1)).email("a@example.com").build());

        let found = store.find_identity(SubjectId(1)).await.unwrap().unwrap();
        assert!(found.is_active());
        assert_eq!(found.role, Role::Member);

        assert!(store.set_status(SubjectId(1), IdentityStatus::Suspended));
        assert!(!store.find_identity(SubjectId(1)).await.unwrap().unwrap().is_active());
        assert!(!store.set_status(SubjectId(2), IdentityStatus::Active));
    }

    #[tokio::test]
    async fn test_external_link() {
        let store = InMemoryIdentityStore::new();
        store.insert(Identity::builder().id(SubjectId(3)).email("c@example.com").build());
        store.link_external("github", "gh-99", SubjectId(3));

        let found = store.find_by_external("github", "gh-99").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(SubjectId(3)));
        assert!(store.find_by_external("gitlab", "gh-99").await.unwrap().is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
    }
}
