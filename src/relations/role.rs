use sea_orm::TransactionTrait;

use super::{Metadata, RelationManager, Role, RoleSpec, TenantRef};
use crate::authz::errors::AuthzError;
use crate::authz::types::RolePermissionMapping;
use crate::entities;
use crate::storage::{self, NewRole};

const ROLE_SCOPES: [&str; 3] = ["system", "organization", "project"];

/// Lowercased scope, or invalid-argument for anything outside the three tiers.
pub fn normalize_scope(scope: &str) -> Result<String, AuthzError> {
    let scope = scope.trim().to_lowercase();
    if ROLE_SCOPES.contains(&scope.as_str()) {
        Ok(scope)
    } else {
        Err(AuthzError::InvalidArgument(format!(
            "role scope '{scope}' must be one of system, organization, project"
        )))
    }
}

fn role_lock_key(name: &str) -> String {
    format!("r:{name}")
}

impl RelationManager {
    pub async fn create_role(&self, role: &Role) -> Result<Role, AuthzError> {
        let name = role.metadata.name.as_str();
        if name.trim().is_empty() {
            return Err(AuthzError::InvalidArgument("role name is required".to_string()));
        }
        let scope = normalize_scope(&role.spec.scope)?;
        let _guard = self.lock_subject(&role_lock_key(name)).await;

        let tenant = self.tenant(&role.metadata.tenant()).await?;
        if storage::find_role_in_tenant(&self.db, name, &tenant).await?.is_some() {
            return Err(AuthzError::Conflict(format!("role '{name}' already exists")));
        }
        let permission_ids = storage::resolve_permission_ids(&self.db, &role.spec.rolepermissions).await?;

        let txn = self.db.begin().await?;
        let row = storage::insert_role(
            &txn,
            NewRole {
                name,
                description: role.metadata.description.clone(),
                is_global: role.spec.is_global,
                scope: &scope,
                builtin: role.spec.builtin,
            },
            &tenant,
        )
        .await?;
        storage::replace_role_permissions(&txn, &row.id, &permission_ids).await?;
        txn.commit().await?;
        tracing::info!(role = name, scope = %scope, "Created role");

        self.commit_role_permissions(name).await?;
        self.get_role(name, &role.metadata.tenant()).await
    }

    /// Replace a role's attributes and permission set. Built-in roles are refused.
    pub async fn update_role(&self, role: &Role) -> Result<Role, AuthzError> {
        let name = role.metadata.name.as_str();
        let scope = normalize_scope(&role.spec.scope)?;
        let _guard = self.lock_subject(&role_lock_key(name)).await;

        let tenant = self.tenant(&role.metadata.tenant()).await?;
        let existing = storage::find_role_in_tenant(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find role '{name}'")))?;
        if existing.builtin {
            return Err(AuthzError::Conflict(format!("builtin role '{name}' cannot be updated")));
        }
        let permission_ids = storage::resolve_permission_ids(&self.db, &role.spec.rolepermissions).await?;

        if let Err(e) = self.authz.delete_role_permission_mappings(name).await {
            tracing::warn!(role = name, error = %e, "Failed to clear role permission mappings");
        }

        let txn = self.db.begin().await?;
        let row = storage::update_role_row(
            &txn,
            existing,
            role.metadata.description.clone(),
            role.spec.is_global,
            &scope,
        )
        .await?;
        storage::replace_role_permissions(&txn, &row.id, &permission_ids).await?;
        txn.commit().await?;
        tracing::info!(role = name, permissions = permission_ids.len(), "Updated role");

        self.commit_role_permissions(name).await?;
        self.get_role(name, &role.metadata.tenant()).await
    }

    pub async fn delete_role(&self, name: &str, tenant_ref: &TenantRef) -> Result<(), AuthzError> {
        let _guard = self.lock_subject(&role_lock_key(name)).await;

        let tenant = self.tenant(tenant_ref).await?;
        let existing = storage::find_role_in_tenant(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find role '{name}'")))?;
        if existing.builtin {
            return Err(AuthzError::Conflict(format!("builtin role '{name}' cannot be deleted")));
        }

        if let Err(e) = self.authz.delete_role_permission_mappings(name).await {
            tracing::warn!(role = name, error = %e, "Failed to clear role permission mappings");
        }

        let txn = self.db.begin().await?;
        storage::delete_role_permissions(&txn, &existing.id).await?;
        storage::trash_role(&txn, existing).await?;
        txn.commit().await?;
        tracing::info!(role = name, "Deleted role");

        // Same-named roles of other tenants keep their bindings.
        self.commit_role_permissions(name).await
    }

    pub async fn get_role(&self, name: &str, tenant_ref: &TenantRef) -> Result<Role, AuthzError> {
        let tenant = self.tenant(tenant_ref).await?;
        let row = storage::find_role_in_tenant(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find role '{name}'")))?;
        self.render_role(row, tenant_ref).await
    }

    pub async fn list_roles(&self, tenant_ref: &TenantRef) -> Result<Vec<Role>, AuthzError> {
        let tenant = self.tenant(tenant_ref).await?;
        let mut roles = Vec::new();
        for row in storage::list_roles(&self.db, &tenant).await? {
            roles.push(self.render_role(row, tenant_ref).await?);
        }
        Ok(roles)
    }

    /// Bind the endpoints of every live role called `role`, across tenants.
    ///
    /// Clearing removes a role name's bindings wholesale, so the rebind covers
    /// the union. A mapping that resolves to no endpoints, or is already
    /// bound, is not a failure; an engine refusal is.
    async fn commit_role_permissions(&self, role: &str) -> Result<(), AuthzError> {
        let permissions = storage::permission_names_for_role_name(&self.db, role).await?;
        if permissions.is_empty() {
            return Ok(());
        }
        let mapping = RolePermissionMapping {
            role: role.to_string(),
            permission: permissions,
        };
        if let Err(e) = self.authz.create_role_permission_mappings(&[mapping]).await {
            tracing::error!(role, error = %e, "Failed to commit role permission mappings");
            return Err(e);
        }
        Ok(())
    }

    async fn render_role(
        &self,
        row: entities::role::Model,
        tenant_ref: &TenantRef,
    ) -> Result<Role, AuthzError> {
        let rolepermissions = storage::role_permission_names(&self.db, &row.id).await?;
        Ok(Role {
            metadata: Metadata {
                name: row.name,
                partner: tenant_ref.partner.clone(),
                organization: tenant_ref.organization.clone(),
                description: row.description,
            },
            spec: RoleSpec {
                is_global: row.is_global,
                scope: row.scope,
                rolepermissions,
                builtin: row.builtin,
            },
        })
    }
}
