//! Keeps relational rows and engine tuples in agreement for groups, roles
//! and users.
//!
//! Every update runs the same sequence under a per-subject lock:
//!
//! 1. plan: resolve every name the request mentions (read-only, fails closed)
//! 2. clear: best-effort removal of the subject's engine tuples
//! 3. rebuild + commit relational: one transaction replaces the rows
//! 4. commit tuples: one batch per tuple kind
//!
//! Step 4 runs after the transaction committed and has no compensation. When
//! it fails the relational store is ahead of the engine until the next
//! [`reconcile`](reconcile::reconcile) run. Reconcile passes and these
//! sequences exclude each other through the gateway's reconcile barrier.

pub mod group;
pub mod identity;
pub mod locks;
pub mod reconcile;
pub mod role;
pub mod user;

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, RwLockReadGuard};

use crate::authz::errors::AuthzError;
use crate::authz::scope::{ProjectNamespaceRole, ResolvedAssignment, ScopeResolver, SubjectKind};
use crate::authz::service::EnforcementGateway;
use crate::authz::types::{Policy, UserGroup};
use crate::storage::{self, Tenant};

pub use identity::{IdentityProvider, IdentityTraits, LocalIdentityProvider};
pub use locks::SubjectLocks;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub partner: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metadata {
    pub fn tenant(&self) -> TenantRef {
        TenantRef {
            partner: self.partner.clone(),
            organization: self.organization.clone(),
        }
    }
}

/// Partner and organization names, as carried by get/list/delete requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub partner: String,
    pub organization: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub project_namespace_roles: Vec<ProjectNamespaceRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: GroupSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    #[serde(default)]
    pub is_global: bool,
    pub scope: String,
    #[serde(default)]
    pub rolepermissions: Vec<String>,
    #[serde(default)]
    pub builtin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub metadata: Metadata,
    pub spec: RoleSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub project_namespace_roles: Vec<ProjectNamespaceRole>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: UserSpec,
}

/// Held for a whole clear -> rebuild -> commit sequence. Fields drop in
/// order, so the subject lock is released before the reconcile barrier.
pub(crate) struct SubjectGuard<'a> {
    _subject: OwnedMutexGuard<()>,
    _barrier: RwLockReadGuard<'a, ()>,
}

pub struct RelationManager {
    db: DatabaseConnection,
    authz: Arc<EnforcementGateway>,
    identity: Arc<dyn IdentityProvider>,
    locks: SubjectLocks,
}

impl RelationManager {
    pub fn new(
        db: DatabaseConnection,
        authz: Arc<EnforcementGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            db,
            authz,
            identity,
            locks: SubjectLocks::new(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn authz(&self) -> &Arc<EnforcementGateway> {
        &self.authz
    }

    pub fn locks(&self) -> &SubjectLocks {
        &self.locks
    }

    /// Serialize against other updates of `key` and against reconcile passes.
    async fn lock_subject(&self, key: &str) -> SubjectGuard<'_> {
        let subject = self.locks.acquire(key).await;
        let barrier = self.authz.update_guard().await;
        SubjectGuard {
            _subject: subject,
            _barrier: barrier,
        }
    }

    async fn tenant(&self, tenant: &TenantRef) -> Result<Tenant, AuthzError> {
        storage::resolve_tenant(&self.db, &tenant.partner, &tenant.organization).await
    }

    /// Resolve every requested assignment; the first unknown role or project
    /// fails the whole request.
    async fn resolve_assignments<C: ConnectionTrait>(
        &self,
        db: &C,
        kind: SubjectKind,
        subject: &str,
        tenant: &Tenant,
        requested: &[ProjectNamespaceRole],
    ) -> Result<Vec<ResolvedAssignment>, AuthzError> {
        let resolver = ScopeResolver {
            kind,
            subject_name: subject,
            organization: &tenant.organization,
            partner_id: &tenant.partner_id,
            organization_id: &tenant.organization_id,
        };
        let mut resolved = Vec::with_capacity(requested.len());
        for request in requested {
            resolved.push(resolver.resolve(db, request).await?);
        }
        Ok(resolved)
    }

    /// Best-effort removal of a subject's policy and membership tuples.
    async fn clear_subject(&self, kind: SubjectKind, name: &str) {
        let subject = kind.subject(name);
        if let Err(e) = self.authz.delete_policies(&Policy::subject(&subject)).await {
            tracing::warn!(subject = %subject, error = %e, "Failed to clear policies");
        }
        let filter = match kind {
            SubjectKind::User => UserGroup::new(&subject, ""),
            SubjectKind::Group => UserGroup::new("", &subject),
        };
        if let Err(e) = self.authz.delete_user_groups(&filter).await {
            tracing::warn!(subject = %subject, error = %e, "Failed to clear user groups");
        }
    }

    /// Submit the policy tuples of a freshly committed assignment set.
    async fn commit_policies(
        &self,
        subject: &str,
        assignments: &[ResolvedAssignment],
    ) -> Result<(), AuthzError> {
        let mut policies: Vec<Policy> = assignments.iter().map(|a| a.policy.clone()).collect();
        policies.sort();
        policies.dedup();
        if policies.is_empty() {
            return Ok(());
        }
        match self.authz.create_policies(&policies).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::error!(subject, tuples = policies.len(), "Engine refused policies");
                Err(AuthzError::Engine(format!(
                    "engine refused policies for {subject}"
                )))
            }
            Err(e) => {
                tracing::error!(subject, tuples = policies.len(), error = %e, "Failed to commit policies");
                Err(e)
            }
        }
    }

    async fn commit_memberships(
        &self,
        subject: &str,
        mut user_groups: Vec<UserGroup>,
    ) -> Result<(), AuthzError> {
        user_groups.sort();
        user_groups.dedup();
        if user_groups.is_empty() {
            return Ok(());
        }
        match self.authz.create_user_groups(&user_groups).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::error!(subject, tuples = user_groups.len(), "Engine refused user groups");
                Err(AuthzError::Engine(format!(
                    "engine refused user groups for {subject}"
                )))
            }
            Err(e) => {
                tracing::error!(subject, tuples = user_groups.len(), error = %e, "Failed to commit user groups");
                Err(e)
            }
        }
    }
}
