//! Public contract of the authorization layer.
//!
//! Every operation validates its input, delegates to the evaluation engine and
//! reports engine failures uniformly. Nothing here touches the relational store
//! except the permission catalog, which reads permission records on first use.
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::authz::catalog::{CatalogSnapshot, PermissionCatalog};
use crate::authz::engine::PolicyEngine;
use crate::authz::errors::AuthzError;
use crate::authz::grouping::{GroupingStore, Membership, RoleBinding};
use crate::authz::translate;
use crate::authz::types::{Policy, RolePermissionMapping, RolePermissionRule, UserGroup};

pub struct EnforcementGateway {
    engine: Arc<dyn PolicyEngine>,
    memberships: GroupingStore<Membership>,
    role_bindings: GroupingStore<RoleBinding>,
    catalog: Arc<PermissionCatalog>,
    barrier: RwLock<()>,
}

impl EnforcementGateway {
    pub fn new(engine: Arc<dyn PolicyEngine>, catalog: Arc<PermissionCatalog>) -> Self {
        Self {
            memberships: GroupingStore::new(engine.clone()),
            role_bindings: GroupingStore::new(engine.clone()),
            engine,
            catalog,
            barrier: RwLock::new(()),
        }
    }

    /// Shared hold taken by every clear -> rebuild -> commit sequence.
    pub async fn update_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.barrier.read().await
    }

    /// Exclusive hold for a reconcile pass: no subject update runs between
    /// reading the desired set and applying the diff.
    pub async fn reconcile_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.barrier.write().await
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn memberships(&self) -> &GroupingStore<Membership> {
        &self.memberships
    }

    pub fn role_bindings(&self) -> &GroupingStore<RoleBinding> {
        &self.role_bindings
    }

    /// Positional pass-through to the engine matcher.
    pub async fn enforce(&self, params: Vec<String>) -> Result<bool, AuthzError> {
        if params.is_empty() {
            return Err(AuthzError::InvalidArgument(
                "enforce requires at least one parameter".to_string(),
            ));
        }
        let allowed = self.engine.enforce(params.clone()).await?;
        tracing::debug!(?params, allowed, "Enforce");
        Ok(allowed)
    }

    pub async fn list_policies(&self, filter: &Policy) -> Vec<Policy> {
        let values = filter.fields().iter().map(|f| f.to_string()).collect();
        translate::to_policies(self.engine.filtered_policy(0, values).await)
    }

    /// All or nothing: one malformed tuple rejects the batch before any write.
    pub async fn create_policies(&self, policies: &[Policy]) -> Result<bool, AuthzError> {
        if policies.is_empty() {
            return Ok(false);
        }
        let rules = translate::from_policies(policies)?;
        let added = self.engine.add_policies(rules).await?;
        tracing::info!(count = policies.len(), added, "Created policies");
        Ok(added)
    }

    /// Removing nothing is not an error; the result is `false`.
    pub async fn delete_policies(&self, filter: &Policy) -> Result<bool, AuthzError> {
        let fields = filter.fields();
        require_filter(&fields, "policy")?;
        let values = fields.iter().map(|f| f.to_string()).collect();
        let removed = self.engine.remove_filtered_policy(0, values).await?;
        tracing::info!(?filter, removed, "Deleted policies");
        Ok(removed)
    }

    pub async fn list_user_groups(&self, filter: &UserGroup) -> Vec<UserGroup> {
        self.memberships
            .list(0, vec![filter.user.clone(), filter.grp.clone()])
            .await
    }

    pub async fn create_user_groups(&self, user_groups: &[UserGroup]) -> Result<bool, AuthzError> {
        if user_groups.is_empty() {
            return Ok(false);
        }
        translate::from_user_groups(user_groups)?;
        let added = self.memberships.add(user_groups.to_vec()).await?;
        tracing::info!(count = user_groups.len(), added, "Created user groups");
        Ok(added)
    }

    pub async fn delete_user_groups(&self, filter: &UserGroup) -> Result<bool, AuthzError> {
        require_filter(&[filter.user.as_str(), filter.grp.as_str()], "user group")?;
        let removed = self
            .memberships
            .remove(0, vec![filter.user.clone(), filter.grp.clone()])
            .await?;
        tracing::info!(?filter, removed, "Deleted user groups");
        Ok(removed)
    }

    /// Underlying role-grouping tuples for `role`, or for every role when empty.
    pub async fn list_role_permission_rules(&self, role: &str) -> Vec<RolePermissionRule> {
        self.role_bindings
            .list(1, vec![role.to_string()])
            .await
    }

    /// Role-grouping tuples collapsed back to permission names.
    pub async fn list_role_permission_mappings(
        &self,
        role: &str,
    ) -> Result<Vec<RolePermissionMapping>, AuthzError> {
        let rules = self.list_role_permission_rules(role).await;
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        let catalog = self.catalog.snapshot().await?;
        Ok(translate::collapse_role_permission_rules(&rules, &catalog))
    }

    /// Expands every permission name through the catalog; one grant may yield many tuples.
    pub async fn create_role_permission_mappings(
        &self,
        mappings: &[RolePermissionMapping],
    ) -> Result<bool, AuthzError> {
        if mappings.is_empty() {
            return Ok(false);
        }
        let catalog = self.catalog.snapshot().await?;
        let rules = self.expand(mappings, &catalog)?;
        if rules.is_empty() {
            tracing::warn!(?mappings, "Role permission mappings resolved to no endpoints");
            return Ok(false);
        }

        // Bindings are keyed by role name only, so another tenant's role of the
        // same name may already hold some of them. The engine refuses a whole
        // batch when any tuple exists; submit only the missing ones.
        let mut bound = HashSet::new();
        let roles: HashSet<&str> = mappings.iter().map(|m| m.role.as_str()).collect();
        for role in roles {
            bound.extend(self.list_role_permission_rules(role).await);
        }
        let requested = rules.len();
        let missing: Vec<RolePermissionRule> =
            rules.into_iter().filter(|r| !bound.contains(r)).collect();
        if missing.is_empty() {
            tracing::debug!(?mappings, "Role permission mappings already bound");
            return Ok(false);
        }

        let count = missing.len();
        if !self.role_bindings.add(missing).await? {
            tracing::error!(mappings = mappings.len(), tuples = count, "Engine refused role permission mappings");
            return Err(AuthzError::Engine(
                "engine refused role permission mappings".to_string(),
            ));
        }
        tracing::info!(
            mappings = mappings.len(),
            tuples = count,
            already_bound = requested - count,
            "Created role permission mappings"
        );
        Ok(true)
    }

    pub async fn delete_role_permission_mappings(&self, role: &str) -> Result<bool, AuthzError> {
        require_filter(&[role], "role permission mapping")?;
        let removed = self.role_bindings.remove(1, vec![role.to_string()]).await?;
        tracing::info!(role, removed, "Deleted role permission mappings");
        Ok(removed)
    }

    fn expand(
        &self,
        mappings: &[RolePermissionMapping],
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<RolePermissionRule>, AuthzError> {
        let mut rules = translate::expand_role_permission_mappings(mappings, catalog)?;
        // Two permissions may share an endpoint; the engine rejects duplicate batches.
        let mut seen = HashSet::new();
        rules.retain(|r| seen.insert(r.clone()));
        Ok(rules)
    }
}

/// Refuse a filter with every field empty, which would match the whole rule set.
fn require_filter(fields: &[&str], what: &str) -> Result<(), AuthzError> {
    if fields.iter().all(|f| f.is_empty()) {
        return Err(AuthzError::InvalidArgument(format!(
            "{what} filter needs at least one non-empty field"
        )));
    }
    Ok(())
}
