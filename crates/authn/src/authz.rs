//! Workspace authorization gate.
//!
//! Decides whether an authenticated identity may act inside a workspace:
//!
//! 1. No identity, or an inactive one: [`AuthError::Unauthenticated`]
//! 2. Admin bypass allowed and identity is [`Role::Admin`]: allowed, without
//!    consulting membership
//! 3. Workspace does not exist: [`AuthError::NotFound`]
//! 4. No membership fact: [`AuthError::Forbidden`]
//! 5. Otherwise allowed, carrying the membership fact for finer checks
//!
//! Membership facts are read-only input owned by the workspace schema and
//! reached through [`MembershipStore`].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taskhub_storage::{SubjectId, WorkspaceId};

use crate::{
    error::AuthError,
    identity::{Identity, Role},
};

/// Role inside a workspace, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    /// Read-only access.
    Viewer,
    /// Regular contributor.
    Member,
    /// Manages members and settings.
    Admin,
    /// Full control, including deletion.
    Owner,
}

/// `subject_id` holds `role` in `workspace_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFact {
    /// Workspace.
    pub workspace_id: WorkspaceId,
    /// Member.
    pub subject_id: SubjectId,
    /// Role held.
    pub role: WorkspaceRole,
}

/// Read access to workspaces and memberships.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Returns `true` if the workspace exists.
    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> Result<bool, AuthError>;

    /// Membership of `subject_id` in `workspace_id`, if any.
    async fn membership(
        &self,
        workspace_id: WorkspaceId,
        subject_id: SubjectId,
    ) -> Result<Option<MembershipFact>, AuthError>;
}

#[derive(Debug, Default)]
struct Memberships {
    workspaces: HashSet<WorkspaceId>,
    facts: HashMap<(WorkspaceId, SubjectId), WorkspaceRole>,
}

/// In-memory [`MembershipStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMembershipDirectory {
    inner: Arc<RwLock<Memberships>>,
}

impl InMemoryMembershipDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workspace.
    pub fn add_workspace(&self, workspace_id: WorkspaceId) {
        self.inner.write().workspaces.insert(workspace_id);
    }

    /// Grants `role` in a workspace, registering the workspace if needed.
    pub fn grant(&self, workspace_id: WorkspaceId, subject_id: SubjectId, role: WorkspaceRole) {
        let mut inner = self.inner.write();
        inner.workspaces.insert(workspace_id);
        inner.facts.insert((workspace_id, subject_id), role);
    }

    /// Removes a membership.
    pub fn revoke(&self, workspace_id: WorkspaceId, subject_id: SubjectId) {
        self.inner.write().facts.remove(&(workspace_id, subject_id));
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipDirectory {
    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> Result<bool, AuthError> {
        Ok(self.inner.read().workspaces.contains(&workspace_id))
    }

    async fn membership(
        &self,
        workspace_id: WorkspaceId,
        subject_id: SubjectId,
    ) -> Result<Option<MembershipFact>, AuthError> {
        let role = self.inner.read().facts.get(&(workspace_id, subject_id)).copied();
        Ok(role.map(|role| MembershipFact { workspace_id, subject_id, role }))
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct AuthorizeOptions {
    /// Let [`Role::Admin`] identities through without membership.
    #[builder(default)]
    pub allow_admin_bypass: bool,
}

/// A successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Allowed through admin bypass. Satisfies every role requirement.
    AdminBypass,
    /// Allowed through membership.
    Member(MembershipFact),
}

impl Authorization {
    /// Requires at least `minimum` in the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if the member's role is lower.
    ///
    /// ```
    /// use taskhub_authn::authz::{Authorization, MembershipFact, WorkspaceRole};
    /// use taskhub_storage::{SubjectId, WorkspaceId};
    ///
    /// let member = Authorization::Member(MembershipFact {
    ///     workspace_id: WorkspaceId(1),
    ///     subject_id: SubjectId(2),
    ///     role: WorkspaceRole::Member,
    /// });
    /// assert!(member.require_role(WorkspaceRole::Viewer).is_ok());
    /// assert!(member.require_role(WorkspaceRole::Owner).is_err());
    /// assert!(Authorization::AdminBypass.require_role(WorkspaceRole::Owner).is_ok());
    /// ```
    pub fn require_role(&self, minimum: WorkspaceRole) -> Result<(), AuthError> {
        match self {
            Self::AdminBypass => Ok(()),
            Self::Member(fact) if fact.role >= minimum => Ok(()),
            Self::Member(_) => Err(AuthError::Forbidden),
        }
    }
}

/// Workspace-membership gate.
#[derive(Debug, Clone)]
pub struct AuthorizationGate<M> {
    memberships: Arc<M>,
}

impl<M: MembershipStore> AuthorizationGate<M> {
    /// Creates a gate over `memberships`.
    pub fn new(memberships: Arc<M>) -> Self {
        Self { memberships }
    }

    /// Authorizes `identity` for `workspace_id`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`], [`AuthError::NotFound`] or
    /// [`AuthError::Forbidden`] per the module rules, or the store's own
    /// error.
    #[tracing::instrument(skip(self, identity), fields(subject = identity.map(|i| i.id.0)))]
    pub async fn authorize(
        &self,
        identity: Option<&Identity>,
        workspace_id: WorkspaceId,
        options: AuthorizeOptions,
    ) -> Result<Authorization, AuthError> {
        let identity = match identity {
            Some(identity) if identity.is_active() => identity,
            _ => return Err(AuthError::Unauthenticated),
        };

        if options.allow_admin_bypass && identity.role == Role::Admin {
            tracing::debug!("admin bypass");
            return Ok(Authorization::AdminBypass);
        }

        if !self.memberships.workspace_exists(workspace_id).await? {
            return Err(AuthError::NotFound);
        }

        match self.memberships.membership(workspace_id, identity.id).await? {
            Some(fact) => Ok(Authorization::Member(fact)),
            None => Err(AuthError::Forbidden),
        }
    }
}
