use sea_orm::TransactionTrait;

use super::{Group, GroupSpec, Metadata, RelationManager, TenantRef};
use crate::authz::errors::AuthzError;
use crate::authz::scope::{ResolvedAssignment, SubjectKind};
use crate::authz::types::UserGroup;
use crate::entities;
use crate::storage::{self, Tenant};

/// Everything a group write needs, resolved before anything is written.
struct GroupPlan {
    member_ids: Vec<String>,
    memberships: Vec<UserGroup>,
    assignments: Vec<ResolvedAssignment>,
}

impl RelationManager {
    async fn plan_group(&self, group: &Group, tenant: &Tenant) -> Result<GroupPlan, AuthzError> {
        let name = &group.metadata.name;
        let grp = SubjectKind::Group.subject(name);

        let mut member_ids = Vec::with_capacity(group.spec.users.len());
        let mut memberships = Vec::with_capacity(group.spec.users.len());
        for username in &group.spec.users {
            let account = storage::find_account_by_username(&self.db, username)
                .await?
                .filter(|a| a.organization_id == tenant.organization_id)
                .ok_or_else(|| AuthzError::NotFound(format!("unable to find user '{username}'")))?;
            if !member_ids.contains(&account.id) {
                member_ids.push(account.id);
                memberships.push(UserGroup::new(&SubjectKind::User.subject(username), &grp));
            }
        }

        let assignments = self
            .resolve_assignments(
                &self.db,
                SubjectKind::Group,
                name,
                tenant,
                &group.spec.project_namespace_roles,
            )
            .await?;

        Ok(GroupPlan {
            member_ids,
            memberships,
            assignments,
        })
    }

    /// Write membership and binding rows for a group inside `txn`.
    async fn write_group_rows<C: sea_orm::ConnectionTrait>(
        txn: &C,
        group_id: &str,
        tenant: &Tenant,
        plan: &GroupPlan,
    ) -> Result<(), AuthzError> {
        let pairs: Vec<(String, String)> = plan
            .member_ids
            .iter()
            .map(|account_id| (group_id.to_string(), account_id.clone()))
            .collect();
        storage::insert_group_accounts(txn, &pairs).await?;
        storage::insert_subject_roles(txn, SubjectKind::Group, group_id, tenant, &plan.assignments)
            .await?;
        Ok(())
    }

    async fn commit_group_tuples(&self, name: &str, plan: GroupPlan) -> Result<(), AuthzError> {
        let subject = SubjectKind::Group.subject(name);
        self.commit_policies(&subject, &plan.assignments).await?;
        self.commit_memberships(&subject, plan.memberships).await
    }

    pub async fn create_group(&self, group: &Group) -> Result<Group, AuthzError> {
        let name = group.metadata.name.as_str();
        if name.trim().is_empty() {
            return Err(AuthzError::InvalidArgument("group name is required".to_string()));
        }
        let _guard = self.lock_subject(&SubjectKind::Group.subject(name)).await;

        let tenant = self.tenant(&group.metadata.tenant()).await?;
        if storage::find_group(&self.db, name, &tenant).await?.is_some() {
            return Err(AuthzError::Conflict(format!("group '{name}' already exists")));
        }
        let plan = self.plan_group(group, &tenant).await?;

        let txn = self.db.begin().await?;
        let row = storage::insert_group(
            &txn,
            name,
            group.metadata.description.clone(),
            group.spec.group_type.clone(),
            &tenant,
        )
        .await?;
        Self::write_group_rows(&txn, &row.id, &tenant, &plan).await?;
        txn.commit().await?;
        tracing::info!(group = name, organization = %tenant.organization, "Created group");

        self.commit_group_tuples(name, plan).await?;
        self.get_group(name, &group.metadata.tenant()).await
    }

    /// Replace a group's members and role assignments with the requested set.
    pub async fn update_group(&self, group: &Group) -> Result<Group, AuthzError> {
        let name = group.metadata.name.as_str();
        let _guard = self.lock_subject(&SubjectKind::Group.subject(name)).await;

        let tenant = self.tenant(&group.metadata.tenant()).await?;
        let existing = storage::find_group(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find group '{name}'")))?;
        let plan = self.plan_group(group, &tenant).await?;

        self.clear_subject(SubjectKind::Group, name).await;

        let txn = self.db.begin().await?;
        storage::delete_group_accounts_for_group(&txn, &existing.id).await?;
        storage::delete_subject_roles(&txn, SubjectKind::Group, &existing.id).await?;
        let row = storage::update_group_row(
            &txn,
            existing,
            group.metadata.description.clone(),
            group.spec.group_type.clone(),
        )
        .await?;
        Self::write_group_rows(&txn, &row.id, &tenant, &plan).await?;
        txn.commit().await?;
        tracing::info!(
            group = name,
            members = plan.member_ids.len(),
            assignments = plan.assignments.len(),
            "Updated group"
        );

        self.commit_group_tuples(name, plan).await?;
        self.get_group(name, &group.metadata.tenant()).await
    }

    pub async fn delete_group(&self, name: &str, tenant_ref: &TenantRef) -> Result<(), AuthzError> {
        let _guard = self.lock_subject(&SubjectKind::Group.subject(name)).await;

        let tenant = self.tenant(tenant_ref).await?;
        let existing = storage::find_group(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find group '{name}'")))?;

        self.clear_subject(SubjectKind::Group, name).await;

        let txn = self.db.begin().await?;
        storage::delete_group_accounts_for_group(&txn, &existing.id).await?;
        storage::delete_subject_roles(&txn, SubjectKind::Group, &existing.id).await?;
        storage::trash_group(&txn, existing).await?;
        txn.commit().await?;
        tracing::info!(group = name, "Deleted group");
        Ok(())
    }

    pub async fn get_group(&self, name: &str, tenant_ref: &TenantRef) -> Result<Group, AuthzError> {
        let tenant = self.tenant(tenant_ref).await?;
        let row = storage::find_group(&self.db, name, &tenant)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find group '{name}'")))?;
        self.render_group(row, tenant_ref).await
    }

    pub async fn list_groups(&self, tenant_ref: &TenantRef) -> Result<Vec<Group>, AuthzError> {
        let tenant = self.tenant(tenant_ref).await?;
        let mut groups = Vec::new();
        for row in storage::list_groups(&self.db, &tenant).await? {
            groups.push(self.render_group(row, tenant_ref).await?);
        }
        Ok(groups)
    }

    async fn render_group(
        &self,
        row: entities::group::Model,
        tenant_ref: &TenantRef,
    ) -> Result<Group, AuthzError> {
        let users = storage::group_member_usernames(&self.db, &row.id).await?;
        let project_namespace_roles =
            storage::list_subject_roles(&self.db, SubjectKind::Group, &row.id).await?;
        Ok(Group {
            metadata: Metadata {
                name: row.name,
                partner: tenant_ref.partner.clone(),
                organization: tenant_ref.organization.clone(),
                description: row.description,
            },
            spec: GroupSpec {
                users,
                project_namespace_roles,
                group_type: row.group_type,
            },
        })
    }
}
