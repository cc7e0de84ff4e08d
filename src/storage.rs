use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Condition, Database, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::authz::errors::AuthzError;
use crate::authz::scope::{ProjectNamespaceRole, ResolvedAssignment, Scope, SubjectKind};
use crate::authz::types::{PermissionRecord, Policy, ResourceUrl, RolePermissionMapping, UserGroup};
use crate::entities;
use crate::errors::WardenError;
use crate::settings::Database as DbCfg;

/// Partner and organization a subject belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub partner_id: String,
    pub organization_id: String,
    pub organization: String,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, WardenError> {
    let db = Database::connect(&cfg.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> i64 {
    Utc::now().timestamp()
}

// Tenancy

pub async fn create_partner<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<entities::partner::Model, AuthzError> {
    let partner = entities::partner::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_string()),
        description: Set(None),
        trash: Set(false),
        created_at: Set(now()),
    };
    Ok(partner.insert(db).await?)
}

pub async fn find_partner_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<entities::partner::Model>, AuthzError> {
    use entities::partner::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

pub async fn create_organization<C: ConnectionTrait>(
    db: &C,
    name: &str,
    partner_id: &str,
) -> Result<entities::organization::Model, AuthzError> {
    let org = entities::organization::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_string()),
        partner_id: Set(partner_id.to_string()),
        trash: Set(false),
        created_at: Set(now()),
    };
    Ok(org.insert(db).await?)
}

pub async fn find_organization_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
    partner_id: &str,
) -> Result<Option<entities::organization::Model>, AuthzError> {
    use entities::organization::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::PartnerId.eq(partner_id))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

/// Resolve partner and organization names to ids.
pub async fn resolve_tenant<C: ConnectionTrait>(
    db: &C,
    partner: &str,
    organization: &str,
) -> Result<Tenant, AuthzError> {
    let partner_row = find_partner_by_name(db, partner)
        .await?
        .ok_or_else(|| AuthzError::NotFound(format!("unable to find partner '{partner}'")))?;
    let org_row = find_organization_by_name(db, organization, &partner_row.id)
        .await?
        .ok_or_else(|| {
            AuthzError::NotFound(format!("unable to find organization '{organization}'"))
        })?;
    Ok(Tenant {
        partner_id: partner_row.id,
        organization_id: org_row.id,
        organization: org_row.name,
    })
}

pub async fn create_project<C: ConnectionTrait>(
    db: &C,
    name: &str,
    tenant: &Tenant,
) -> Result<entities::project::Model, AuthzError> {
    let project = entities::project::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_string()),
        partner_id: Set(tenant.partner_id.clone()),
        organization_id: Set(tenant.organization_id.clone()),
        trash: Set(false),
        created_at: Set(now()),
    };
    Ok(project.insert(db).await?)
}

pub async fn find_project_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
    organization_id: &str,
) -> Result<Option<entities::project::Model>, AuthzError> {
    use entities::project::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::OrganizationId.eq(organization_id))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

// Permissions

fn to_permission_record(model: entities::permission::Model) -> Result<PermissionRecord, AuthzError> {
    let resource_urls: Vec<ResourceUrl> = serde_json::from_str(&model.resource_urls)?;
    let resource_action_urls: Vec<ResourceUrl> = serde_json::from_str(&model.resource_action_urls)?;
    Ok(PermissionRecord {
        name: model.name,
        base_url: model.base_url,
        resource_urls,
        resource_action_urls,
    })
}

pub async fn list_permissions<C: ConnectionTrait>(db: &C) -> Result<Vec<PermissionRecord>, AuthzError> {
    use entities::permission::{Column, Entity};

    Entity::find()
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(to_permission_record)
        .collect()
}

/// Insert a permission record, or refresh the urls of the one with the same
/// (name, base url). Returns true when something changed.
pub async fn upsert_permission<C: ConnectionTrait>(
    db: &C,
    record: &PermissionRecord,
) -> Result<bool, AuthzError> {
    use entities::permission::{Column, Entity};

    let resource_urls = serde_json::to_string(&record.resource_urls)?;
    let resource_action_urls = serde_json::to_string(&record.resource_action_urls)?;

    let existing = Entity::find()
        .filter(Column::Name.eq(&record.name))
        .filter(Column::BaseUrl.eq(&record.base_url))
        .one(db)
        .await?;

    match existing {
        None => {
            let permission = entities::permission::ActiveModel {
                id: Set(new_id()),
                name: Set(record.name.clone()),
                base_url: Set(record.base_url.clone()),
                resource_urls: Set(resource_urls),
                resource_action_urls: Set(resource_action_urls),
            };
            permission.insert(db).await?;
            Ok(true)
        }
        Some(model)
            if model.resource_urls == resource_urls
                && model.resource_action_urls == resource_action_urls =>
        {
            Ok(false)
        }
        Some(model) => {
            let mut active = model.into_active_model();
            active.resource_urls = Set(resource_urls);
            active.resource_action_urls = Set(resource_action_urls);
            active.update(db).await?;
            Ok(true)
        }
    }
}

/// Map permission names to record ids, failing on the first unknown name.
pub async fn resolve_permission_ids<C: ConnectionTrait>(
    db: &C,
    names: &[String],
) -> Result<Vec<String>, AuthzError> {
    use entities::permission::{Column, Entity};

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let record = Entity::find()
            .filter(Column::Name.eq(name))
            .order_by_asc(Column::Id)
            .one(db)
            .await?
            .ok_or_else(|| {
                AuthzError::InvalidArgument(format!("unable to find role permission '{name}'"))
            })?;
        ids.push(record.id);
    }
    Ok(ids)
}

// Roles

pub struct NewRole<'a> {
    pub name: &'a str,
    pub description: Option<String>,
    pub is_global: bool,
    pub scope: &'a str,
    pub builtin: bool,
}

pub async fn insert_role<C: ConnectionTrait>(
    db: &C,
    input: NewRole<'_>,
    tenant: &Tenant,
) -> Result<entities::role::Model, AuthzError> {
    let ts = now();
    let role = entities::role::ActiveModel {
        id: Set(new_id()),
        name: Set(input.name.to_string()),
        description: Set(input.description),
        is_global: Set(input.is_global),
        scope: Set(input.scope.to_string()),
        builtin: Set(input.builtin),
        partner_id: Set(tenant.partner_id.clone()),
        organization_id: Set(tenant.organization_id.clone()),
        trash: Set(false),
        created_at: Set(ts),
        modified_at: Set(ts),
    };
    Ok(role.insert(db).await?)
}

pub async fn update_role_row<C: ConnectionTrait>(
    db: &C,
    role: entities::role::Model,
    description: Option<String>,
    is_global: bool,
    scope: &str,
) -> Result<entities::role::Model, AuthzError> {
    let mut active = role.into_active_model();
    active.description = Set(description);
    active.is_global = Set(is_global);
    active.scope = Set(scope.to_string());
    active.modified_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn trash_role<C: ConnectionTrait>(
    db: &C,
    role: entities::role::Model,
) -> Result<(), AuthzError> {
    let mut active = role.into_active_model();
    active.trash = Set(true);
    active.modified_at = Set(now());
    active.update(db).await?;
    Ok(())
}

/// Role defined in the given organization.
pub async fn find_role_in_tenant<C: ConnectionTrait>(
    db: &C,
    name: &str,
    tenant: &Tenant,
) -> Result<Option<entities::role::Model>, AuthzError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::PartnerId.eq(&tenant.partner_id))
        .filter(Column::OrganizationId.eq(&tenant.organization_id))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

/// Role usable for an assignment: defined in the organization, or global.
pub async fn find_role_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
    partner_id: &str,
    organization_id: &str,
) -> Result<Option<entities::role::Model>, AuthzError> {
    use entities::role::{Column, Entity};

    let candidates = Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::Trash.eq(false))
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(Column::PartnerId.eq(partner_id))
                        .add(Column::OrganizationId.eq(organization_id)),
                )
                .add(Column::IsGlobal.eq(true)),
        )
        .all(db)
        .await?;

    // An organization's own role shadows a global one with the same name.
    let (local, global): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|r| r.organization_id == organization_id);
    Ok(local.into_iter().next().or_else(|| global.into_iter().next()))
}

pub async fn list_roles<C: ConnectionTrait>(
    db: &C,
    tenant: &Tenant,
) -> Result<Vec<entities::role::Model>, AuthzError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::OrganizationId.eq(&tenant.organization_id))
        .filter(Column::Trash.eq(false))
        .order_by_asc(Column::Name)
        .all(db)
        .await?)
}

pub async fn replace_role_permissions<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
    permission_ids: &[String],
) -> Result<(), AuthzError> {
    delete_role_permissions(db, role_id).await?;
    if permission_ids.is_empty() {
        return Ok(());
    }
    let rows = permission_ids
        .iter()
        .map(|pid| entities::role_permission::ActiveModel {
            role_id: Set(role_id.to_string()),
            permission_id: Set(pid.clone()),
            ..Default::default()
        });
    entities::RolePermission::insert_many(rows).exec(db).await?;
    Ok(())
}

pub async fn delete_role_permissions<C: ConnectionTrait>(db: &C, role_id: &str) -> Result<u64, AuthzError> {
    use entities::role_permission::{Column, Entity};

    let res = Entity::delete_many()
        .filter(Column::RoleId.eq(role_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Distinct permission names granted to a role, sorted.
pub async fn role_permission_names<C: ConnectionTrait>(
    db: &C,
    role_id: &str,
) -> Result<Vec<String>, AuthzError> {
    use entities::role_permission::{Column, Entity};

    let rows = Entity::find().filter(Column::RoleId.eq(role_id)).all(db).await?;
    let ids: Vec<String> = rows.into_iter().map(|r| r.permission_id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = entities::Permission::find()
        .filter(entities::permission::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Permission names granted by every live role called `name`, in any tenant.
///
/// The engine binds endpoints to a role name, so this union is what the
/// engine should hold for that name.
pub async fn permission_names_for_role_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Vec<String>, AuthzError> {
    let roles = entities::Role::find()
        .filter(entities::role::Column::Name.eq(name))
        .filter(entities::role::Column::Trash.eq(false))
        .all(db)
        .await?;
    let mut names = Vec::new();
    for role in roles {
        names.extend(role_permission_names(db, &role.id).await?);
    }
    names.sort();
    names.dedup();
    Ok(names)
}

// Groups and accounts

pub async fn insert_group<C: ConnectionTrait>(
    db: &C,
    name: &str,
    description: Option<String>,
    group_type: Option<String>,
    tenant: &Tenant,
) -> Result<entities::group::Model, AuthzError> {
    let ts = now();
    let group = entities::group::ActiveModel {
        id: Set(new_id()),
        name: Set(name.to_string()),
        description: Set(description),
        group_type: Set(group_type),
        partner_id: Set(tenant.partner_id.clone()),
        organization_id: Set(tenant.organization_id.clone()),
        trash: Set(false),
        created_at: Set(ts),
        modified_at: Set(ts),
    };
    Ok(group.insert(db).await?)
}

pub async fn update_group_row<C: ConnectionTrait>(
    db: &C,
    group: entities::group::Model,
    description: Option<String>,
    group_type: Option<String>,
) -> Result<entities::group::Model, AuthzError> {
    let mut active = group.into_active_model();
    active.description = Set(description);
    active.group_type = Set(group_type);
    active.modified_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn trash_group<C: ConnectionTrait>(
    db: &C,
    group: entities::group::Model,
) -> Result<(), AuthzError> {
    let mut active = group.into_active_model();
    active.trash = Set(true);
    active.modified_at = Set(now());
    active.update(db).await?;
    Ok(())
}

pub async fn find_group<C: ConnectionTrait>(
    db: &C,
    name: &str,
    tenant: &Tenant,
) -> Result<Option<entities::group::Model>, AuthzError> {
    use entities::group::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::OrganizationId.eq(&tenant.organization_id))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

pub async fn list_groups<C: ConnectionTrait>(
    db: &C,
    tenant: &Tenant,
) -> Result<Vec<entities::group::Model>, AuthzError> {
    use entities::group::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::OrganizationId.eq(&tenant.organization_id))
        .filter(Column::Trash.eq(false))
        .order_by_asc(Column::Name)
        .all(db)
        .await?)
}

pub struct NewAccount<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn insert_account<C: ConnectionTrait>(
    db: &C,
    input: NewAccount<'_>,
    tenant: &Tenant,
) -> Result<entities::account::Model, AuthzError> {
    let ts = now();
    let account = entities::account::ActiveModel {
        id: Set(input.id.to_string()),
        username: Set(input.username.to_string()),
        first_name: Set(input.first_name),
        last_name: Set(input.last_name),
        partner_id: Set(tenant.partner_id.clone()),
        organization_id: Set(tenant.organization_id.clone()),
        trash: Set(false),
        created_at: Set(ts),
        modified_at: Set(ts),
    };
    Ok(account.insert(db).await?)
}

pub async fn update_account_row<C: ConnectionTrait>(
    db: &C,
    account: entities::account::Model,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<entities::account::Model, AuthzError> {
    let mut active = account.into_active_model();
    active.first_name = Set(first_name);
    active.last_name = Set(last_name);
    active.modified_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn trash_account<C: ConnectionTrait>(
    db: &C,
    account: entities::account::Model,
) -> Result<(), AuthzError> {
    let mut active = account.into_active_model();
    active.trash = Set(true);
    active.modified_at = Set(now());
    active.update(db).await?;
    Ok(())
}

pub async fn find_account_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<entities::account::Model>, AuthzError> {
    use entities::account::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .filter(Column::Trash.eq(false))
        .one(db)
        .await?)
}

pub async fn insert_group_accounts<C: ConnectionTrait>(
    db: &C,
    pairs: &[(String, String)],
) -> Result<(), AuthzError> {
    if pairs.is_empty() {
        return Ok(());
    }
    let ts = now();
    let rows = pairs
        .iter()
        .map(|(group_id, account_id)| entities::group_account::ActiveModel {
            group_id: Set(group_id.clone()),
            account_id: Set(account_id.clone()),
            active: Set(true),
            created_at: Set(ts),
            ..Default::default()
        });
    entities::GroupAccount::insert_many(rows).exec(db).await?;
    Ok(())
}

pub async fn delete_group_accounts_for_group<C: ConnectionTrait>(
    db: &C,
    group_id: &str,
) -> Result<u64, AuthzError> {
    use entities::group_account::{Column, Entity};

    let res = Entity::delete_many()
        .filter(Column::GroupId.eq(group_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

pub async fn delete_group_accounts_for_account<C: ConnectionTrait>(
    db: &C,
    account_id: &str,
) -> Result<u64, AuthzError> {
    use entities::group_account::{Column, Entity};

    let res = Entity::delete_many()
        .filter(Column::AccountId.eq(account_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Usernames of the live members of a group, sorted.
pub async fn group_member_usernames<C: ConnectionTrait>(
    db: &C,
    group_id: &str,
) -> Result<Vec<String>, AuthzError> {
    use entities::group_account::{Column, Entity};

    let account_ids: Vec<String> = Entity::find()
        .filter(Column::GroupId.eq(group_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.account_id)
        .collect();
    if account_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = entities::Account::find()
        .filter(entities::account::Column::Id.is_in(account_ids))
        .filter(entities::account::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|a| a.username)
        .collect();
    names.sort();
    Ok(names)
}

/// Names of the live groups an account belongs to, sorted.
pub async fn account_group_names<C: ConnectionTrait>(
    db: &C,
    account_id: &str,
) -> Result<Vec<String>, AuthzError> {
    use entities::group_account::{Column, Entity};

    let group_ids: Vec<String> = Entity::find()
        .filter(Column::AccountId.eq(account_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.group_id)
        .collect();
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = entities::Group::find()
        .filter(entities::group::Column::Id.is_in(group_ids))
        .filter(entities::group::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|g| g.name)
        .collect();
    names.sort();
    Ok(names)
}

// Subject-role bindings

/// Remove a subject's bindings from all three scope tables.
pub async fn delete_subject_roles<C: ConnectionTrait>(
    db: &C,
    kind: SubjectKind,
    subject_id: &str,
) -> Result<u64, AuthzError> {
    let removed = match kind {
        SubjectKind::Group => {
            use entities::{project_group_namespace_role as pgnr, project_group_role as pgr};
            entities::GroupRole::delete_many()
                .filter(entities::group_role::Column::GroupId.eq(subject_id))
                .exec(db)
                .await?
                .rows_affected
                + entities::ProjectGroupRole::delete_many()
                    .filter(pgr::Column::GroupId.eq(subject_id))
                    .exec(db)
                    .await?
                    .rows_affected
                + entities::ProjectGroupNamespaceRole::delete_many()
                    .filter(pgnr::Column::GroupId.eq(subject_id))
                    .exec(db)
                    .await?
                    .rows_affected
        }
        SubjectKind::User => {
            use entities::{project_account_namespace_role as panr, project_account_role as par};
            entities::AccountRole::delete_many()
                .filter(entities::account_role::Column::AccountId.eq(subject_id))
                .exec(db)
                .await?
                .rows_affected
                + entities::ProjectAccountRole::delete_many()
                    .filter(par::Column::AccountId.eq(subject_id))
                    .exec(db)
                    .await?
                    .rows_affected
                + entities::ProjectAccountNamespaceRole::delete_many()
                    .filter(panr::Column::AccountId.eq(subject_id))
                    .exec(db)
                    .await?
                    .rows_affected
        }
    };
    Ok(removed)
}

/// Insert one row per assignment into the table its scope selects.
pub async fn insert_subject_roles<C: ConnectionTrait>(
    db: &C,
    kind: SubjectKind,
    subject_id: &str,
    tenant: &Tenant,
    assignments: &[ResolvedAssignment],
) -> Result<(), AuthzError> {
    let ts = now();
    for a in assignments {
        let project_id = a.project_id.clone().unwrap_or_default();
        match (kind, &a.scope) {
            (SubjectKind::Group, Scope::Global) => {
                entities::group_role::ActiveModel {
                    group_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            (SubjectKind::Group, Scope::Project { .. }) => {
                entities::project_group_role::ActiveModel {
                    group_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    project_id: Set(project_id),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            (SubjectKind::Group, Scope::Namespace { namespace, .. }) => {
                entities::project_group_namespace_role::ActiveModel {
                    group_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    project_id: Set(project_id),
                    namespace: Set(namespace.clone()),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            (SubjectKind::User, Scope::Global) => {
                entities::account_role::ActiveModel {
                    account_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            (SubjectKind::User, Scope::Project { .. }) => {
                entities::project_account_role::ActiveModel {
                    account_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    project_id: Set(project_id),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
            (SubjectKind::User, Scope::Namespace { namespace, .. }) => {
                entities::project_account_namespace_role::ActiveModel {
                    account_id: Set(subject_id.to_string()),
                    role_id: Set(a.role_id.clone()),
                    project_id: Set(project_id),
                    namespace: Set(namespace.clone()),
                    partner_id: Set(tenant.partner_id.clone()),
                    organization_id: Set(tenant.organization_id.clone()),
                    active: Set(true),
                    created_at: Set(ts),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(())
}

/// A binding row with ids, independent of which table it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRow {
    pub subject_id: String,
    pub role_id: String,
    pub organization_id: String,
    pub project_id: Option<String>,
    pub namespace: Option<String>,
}

/// Binding rows of one subject, or of every subject of `kind` when `subject_id` is `None`.
pub async fn list_binding_rows<C: ConnectionTrait>(
    db: &C,
    kind: SubjectKind,
    subject_id: Option<&str>,
) -> Result<Vec<BindingRow>, AuthzError> {
    let mut rows = Vec::new();
    match kind {
        SubjectKind::Group => {
            use entities::{group_role as gr, project_group_namespace_role as pgnr, project_group_role as pgr};

            let mut q = gr::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(gr::Column::GroupId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.group_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: None,
                namespace: None,
            }));

            let mut q = pgr::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(pgr::Column::GroupId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.group_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: Some(r.project_id),
                namespace: None,
            }));

            let mut q = pgnr::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(pgnr::Column::GroupId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.group_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: Some(r.project_id),
                namespace: Some(r.namespace),
            }));
        }
        SubjectKind::User => {
            use entities::{
                account_role as ar, project_account_namespace_role as panr, project_account_role as par,
            };

            let mut q = ar::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(ar::Column::AccountId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.account_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: None,
                namespace: None,
            }));

            let mut q = par::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(par::Column::AccountId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.account_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: Some(r.project_id),
                namespace: None,
            }));

            let mut q = panr::Entity::find();
            if let Some(id) = subject_id {
                q = q.filter(panr::Column::AccountId.eq(id));
            }
            rows.extend(q.all(db).await?.into_iter().map(|r| BindingRow {
                subject_id: r.account_id,
                role_id: r.role_id,
                organization_id: r.organization_id,
                project_id: Some(r.project_id),
                namespace: Some(r.namespace),
            }));
        }
    }
    Ok(rows)
}

/// Id -> name lookups used to render binding rows.
#[derive(Debug, Default)]
pub struct NameIndex {
    pub roles: HashMap<String, String>,
    pub projects: HashMap<String, String>,
    pub organizations: HashMap<String, String>,
}

impl NameIndex {
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, AuthzError> {
        let roles = entities::Role::find()
            .filter(entities::role::Column::Trash.eq(false))
            .all(db)
            .await?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        let projects = entities::Project::find()
            .filter(entities::project::Column::Trash.eq(false))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let organizations = entities::Organization::find()
            .filter(entities::organization::Column::Trash.eq(false))
            .all(db)
            .await?
            .into_iter()
            .map(|o| (o.id, o.name))
            .collect();
        Ok(Self {
            roles,
            projects,
            organizations,
        })
    }

    /// `None` when the row points at a trashed or missing role or project.
    pub fn assignment(&self, row: &BindingRow) -> Option<ProjectNamespaceRole> {
        let role = self.roles.get(&row.role_id)?;
        let project = match &row.project_id {
            Some(id) => Some(self.projects.get(id)?.clone()),
            None => None,
        };
        Some(ProjectNamespaceRole {
            role: role.clone(),
            project,
            namespace: row.namespace.clone(),
        })
    }
}

/// Role assignments of one subject, by name.
pub async fn list_subject_roles<C: ConnectionTrait>(
    db: &C,
    kind: SubjectKind,
    subject_id: &str,
) -> Result<Vec<ProjectNamespaceRole>, AuthzError> {
    let rows = list_binding_rows(db, kind, Some(subject_id)).await?;
    let names = NameIndex::load(db).await?;
    Ok(rows.iter().filter_map(|row| names.assignment(row)).collect())
}

// Desired engine state, derived from the relational store

/// Policy tuples every live binding row should have in the engine.
pub async fn desired_policies<C: ConnectionTrait>(db: &C) -> Result<Vec<Policy>, AuthzError> {
    let names = NameIndex::load(db).await?;
    let groups: HashMap<String, String> = entities::Group::find()
        .filter(entities::group::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();
    let accounts: HashMap<String, String> = entities::Account::find()
        .filter(entities::account::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a.username))
        .collect();

    let mut policies = Vec::new();
    for (kind, subjects) in [(SubjectKind::Group, &groups), (SubjectKind::User, &accounts)] {
        for row in list_binding_rows(db, kind, None).await? {
            let (Some(subject), Some(org)) = (
                subjects.get(&row.subject_id),
                names.organizations.get(&row.organization_id),
            ) else {
                continue;
            };
            let Some(assignment) = names.assignment(&row) else {
                continue;
            };
            let scope = Scope::classify(assignment.project.as_deref(), assignment.namespace.as_deref())?;
            policies.push(scope.policy(&kind.subject(subject), org, &assignment.role));
        }
    }
    policies.sort();
    policies.dedup();
    Ok(policies)
}

/// Membership tuples for every live group member.
pub async fn desired_memberships<C: ConnectionTrait>(db: &C) -> Result<Vec<UserGroup>, AuthzError> {
    let groups: HashMap<String, String> = entities::Group::find()
        .filter(entities::group::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();
    let accounts: HashMap<String, String> = entities::Account::find()
        .filter(entities::account::Column::Trash.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a.username))
        .collect();

    let mut memberships: Vec<UserGroup> = entities::GroupAccount::find()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|row| {
            let user = accounts.get(&row.account_id)?;
            let group = groups.get(&row.group_id)?;
            Some(UserGroup::new(
                &SubjectKind::User.subject(user),
                &SubjectKind::Group.subject(group),
            ))
        })
        .collect();
    memberships.sort();
    memberships.dedup();
    Ok(memberships)
}

/// Permission names granted to each live role.
pub async fn role_permission_grants<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<RolePermissionMapping>, AuthzError> {
    let roles = entities::Role::find()
        .filter(entities::role::Column::Trash.eq(false))
        .order_by_asc(entities::role::Column::Name)
        .all(db)
        .await?;
    let mut grants = Vec::new();
    for role in roles {
        let permission = role_permission_names(db, &role.id).await?;
        if !permission.is_empty() {
            grants.push(RolePermissionMapping {
                role: role.name,
                permission,
            });
        }
    }
    Ok(grants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DatabaseConnection};
    use tempfile::NamedTempFile;

    /// Test database helper that keeps temp file alive
    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");

            migration::Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }

        fn connection(&self) -> &DatabaseConnection {
            &self.connection
        }
    }

    async fn tenant(db: &DatabaseConnection) -> Tenant {
        let partner = create_partner(db, "acme-partner").await.unwrap();
        create_organization(db, "acme", &partner.id).await.unwrap();
        resolve_tenant(db, "acme-partner", "acme").await.unwrap()
    }

    #[tokio::test]
    async fn test_resolve_tenant_unknown_partner() {
        let test_db = TestDb::new().await;
        let err = resolve_tenant(test_db.connection(), "nobody", "acme")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_permission_is_idempotent() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let record = PermissionRecord {
            name: "cluster.read".into(),
            base_url: "/api/v1".into(),
            resource_urls: vec![ResourceUrl {
                url: "/clusters".into(),
                methods: vec!["GET".into()],
            }],
            resource_action_urls: vec![],
        };

        assert!(upsert_permission(db, &record).await.unwrap());
        assert!(!upsert_permission(db, &record).await.unwrap());

        let stored = list_permissions(db).await.unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[tokio::test]
    async fn test_resolve_permission_ids_unknown_name() {
        let test_db = TestDb::new().await;
        let err = resolve_permission_ids(test_db.connection(), &["missing".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to find role permission 'missing'"));
    }

    #[tokio::test]
    async fn test_subject_roles_land_in_scope_tables() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let tenant = tenant(db).await;
        let project = create_project(db, "proj1", &tenant).await.unwrap();
        let role = insert_role(
            db,
            NewRole {
                name: "editor",
                description: None,
                is_global: false,
                scope: "project",
                builtin: false,
            },
            &tenant,
        )
        .await
        .unwrap();
        let group = insert_group(db, "g1", None, None, &tenant).await.unwrap();

        let assignments = vec![
            ResolvedAssignment {
                role_id: role.id.clone(),
                scope: Scope::Global,
                project_id: None,
                policy: Policy::new("g:g1", "*", "*", "acme", "editor"),
            },
            ResolvedAssignment {
                role_id: role.id.clone(),
                scope: Scope::Namespace {
                    project: "proj1".into(),
                    namespace: "team-a".into(),
                },
                project_id: Some(project.id.clone()),
                policy: Policy::new("g:g1", "team-a", "proj1", "acme", "editor"),
            },
        ];
        insert_subject_roles(db, SubjectKind::Group, &group.id, &tenant, &assignments)
            .await
            .unwrap();

        let global = entities::GroupRole::find().all(db).await.unwrap();
        let namespaced = entities::ProjectGroupNamespaceRole::find().all(db).await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(namespaced.len(), 1);
        assert_eq!(namespaced[0].namespace, "team-a");

        let listed = list_subject_roles(db, SubjectKind::Group, &group.id).await.unwrap();
        assert!(listed.contains(&ProjectNamespaceRole::new("editor", Some("proj1"), Some("team-a"))));

        let desired = desired_policies(db).await.unwrap();
        assert_eq!(
            desired,
            vec![
                Policy::new("g:g1", "*", "*", "acme", "editor"),
                Policy::new("g:g1", "team-a", "proj1", "acme", "editor"),
            ]
        );

        let removed = delete_subject_roles(db, SubjectKind::Group, &group.id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(desired_policies(db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_global_role_visible_from_other_organization() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let tenant = tenant(db).await;
        insert_role(
            db,
            NewRole {
                name: "ADMIN",
                description: None,
                is_global: true,
                scope: "system",
                builtin: true,
            },
            &tenant,
        )
        .await
        .unwrap();

        let found = find_role_by_name(db, "ADMIN", "other-partner", "other-org")
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = find_role_by_name(db, "viewer", &tenant.partner_id, &tenant.organization_id)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
