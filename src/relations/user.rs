use sea_orm::TransactionTrait;

use super::{IdentityTraits, Metadata, RelationManager, TenantRef, User, UserSpec};
use crate::authz::errors::AuthzError;
use crate::authz::scope::{ResolvedAssignment, SubjectKind};
use crate::authz::types::UserGroup;
use crate::entities;
use crate::storage::{self, NewAccount, Tenant};

struct UserPlan {
    group_ids: Vec<String>,
    memberships: Vec<UserGroup>,
    assignments: Vec<ResolvedAssignment>,
}

fn traits_of(user: &User) -> IdentityTraits {
    IdentityTraits {
        username: user.metadata.name.clone(),
        first_name: user.spec.first_name.clone(),
        last_name: user.spec.last_name.clone(),
    }
}

impl RelationManager {
    async fn plan_user(&self, user: &User, tenant: &Tenant) -> Result<UserPlan, AuthzError> {
        let name = &user.metadata.name;
        let subject = SubjectKind::User.subject(name);

        let mut group_ids = Vec::with_capacity(user.spec.groups.len());
        let mut memberships = Vec::with_capacity(user.spec.groups.len());
        for group in &user.spec.groups {
            let row = storage::find_group(&self.db, group, tenant)
                .await?
                .ok_or_else(|| AuthzError::NotFound(format!("unable to find group '{group}'")))?;
            if !group_ids.contains(&row.id) {
                group_ids.push(row.id);
                memberships.push(UserGroup::new(&subject, &SubjectKind::Group.subject(group)));
            }
        }

        let assignments = self
            .resolve_assignments(
                &self.db,
                SubjectKind::User,
                name,
                tenant,
                &user.spec.project_namespace_roles,
            )
            .await?;

        Ok(UserPlan {
            group_ids,
            memberships,
            assignments,
        })
    }

    async fn write_user_rows<C: sea_orm::ConnectionTrait>(
        txn: &C,
        account_id: &str,
        tenant: &Tenant,
        plan: &UserPlan,
    ) -> Result<(), AuthzError> {
        let pairs: Vec<(String, String)> = plan
            .group_ids
            .iter()
            .map(|group_id| (group_id.clone(), account_id.to_string()))
            .collect();
        storage::insert_group_accounts(txn, &pairs).await?;
        storage::insert_subject_roles(txn, SubjectKind::User, account_id, tenant, &plan.assignments)
            .await?;
        Ok(())
    }

    async fn commit_user_tuples(&self, name: &str, plan: UserPlan) -> Result<(), AuthzError> {
        let subject = SubjectKind::User.subject(name);
        self.commit_policies(&subject, &plan.assignments).await?;
        self.commit_memberships(&subject, plan.memberships).await
    }

    async fn find_user_row(
        &self,
        name: &str,
        tenant: &Tenant,
    ) -> Result<entities::account::Model, AuthzError> {
        storage::find_account_by_username(&self.db, name)
            .await?
            .filter(|a| a.organization_id == tenant.organization_id)
            .ok_or_else(|| AuthzError::NotFound(format!("unable to find user '{name}'")))
    }

    /// Creates the identity first; if the relational half then fails the
    /// identity is removed again.
    pub async fn create_user(&self, user: &User) -> Result<User, AuthzError> {
        let name = user.metadata.name.as_str();
        if name.trim().is_empty() {
            return Err(AuthzError::InvalidArgument("username is required".to_string()));
        }
        let _guard = self.lock_subject(&SubjectKind::User.subject(name)).await;

        let tenant = self.tenant(&user.metadata.tenant()).await?;
        if storage::find_account_by_username(&self.db, name).await?.is_some() {
            return Err(AuthzError::Conflict(format!("user '{name}' already exists")));
        }
        let plan = self.plan_user(user, &tenant).await?;

        let account_id = self.identity.create(&traits_of(user)).await?;
        let written = async {
            let txn = self.db.begin().await?;
            storage::insert_account(
                &txn,
                NewAccount {
                    id: &account_id,
                    username: name,
                    first_name: user.spec.first_name.clone(),
                    last_name: user.spec.last_name.clone(),
                },
                &tenant,
            )
            .await?;
            Self::write_user_rows(&txn, &account_id, &tenant, &plan).await?;
            txn.commit().await?;
            Ok::<_, AuthzError>(())
        }
        .await;
        if let Err(e) = written {
            if let Err(cleanup) = self.identity.delete(&account_id).await {
                tracing::warn!(user = name, error = %cleanup, "Failed to remove orphaned identity");
            }
            return Err(e);
        }
        tracing::info!(user = name, organization = %tenant.organization, "Created user");

        self.commit_user_tuples(name, plan).await?;
        self.get_user(name, &user.metadata.tenant()).await
    }

    pub async fn update_user(&self, user: &User) -> Result<User, AuthzError> {
        let name = user.metadata.name.as_str();
        let _guard = self.lock_subject(&SubjectKind::User.subject(name)).await;

        let tenant = self.tenant(&user.metadata.tenant()).await?;
        let existing = self.find_user_row(name, &tenant).await?;
        let plan = self.plan_user(user, &tenant).await?;

        self.identity.update(&existing.id, &traits_of(user)).await?;
        self.clear_subject(SubjectKind::User, name).await;

        let txn = self.db.begin().await?;
        storage::delete_group_accounts_for_account(&txn, &existing.id).await?;
        storage::delete_subject_roles(&txn, SubjectKind::User, &existing.id).await?;
        let row = storage::update_account_row(
            &txn,
            existing,
            user.spec.first_name.clone(),
            user.spec.last_name.clone(),
        )
        .await?;
        Self::write_user_rows(&txn, &row.id, &tenant, &plan).await?;
        txn.commit().await?;
        tracing::info!(
            user = name,
            groups = plan.group_ids.len(),
            assignments = plan.assignments.len(),
            "Updated user"
        );

        self.commit_user_tuples(name, plan).await?;
        self.get_user(name, &user.metadata.tenant()).await
    }

    pub async fn delete_user(&self, name: &str, tenant_ref: &TenantRef) -> Result<(), AuthzError> {
        let _guard = self.lock_subject(&SubjectKind::User.subject(name)).await;

        let tenant = self.tenant(tenant_ref).await?;
        let existing = self.find_user_row(name, &tenant).await?;
        let account_id = existing.id.clone();

        self.clear_subject(SubjectKind::User, name).await;

        let txn = self.db.begin().await?;
        storage::delete_group_accounts_for_account(&txn, &account_id).await?;
        storage::delete_subject_roles(&txn, SubjectKind::User, &account_id).await?;
        storage::trash_account(&txn, existing).await?;
        txn.commit().await?;

        self.identity.delete(&account_id).await?;
        tracing::info!(user = name, "Deleted user");
        Ok(())
    }

    pub async fn get_user(&self, name: &str, tenant_ref: &TenantRef) -> Result<User, AuthzError> {
        let tenant = self.tenant(tenant_ref).await?;
        let row = self.find_user_row(name, &tenant).await?;
        let groups = storage::account_group_names(&self.db, &row.id).await?;
        let project_namespace_roles =
            storage::list_subject_roles(&self.db, SubjectKind::User, &row.id).await?;
        Ok(User {
            metadata: Metadata {
                name: row.username,
                partner: tenant_ref.partner.clone(),
                organization: tenant_ref.organization.clone(),
                description: None,
            },
            spec: UserSpec {
                first_name: row.first_name,
                last_name: row.last_name,
                groups,
                project_namespace_roles,
            },
        })
    }
}
