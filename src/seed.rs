use crate::authz::types::PermissionRecord;
use crate::relations::role::normalize_scope;
use crate::storage::{self, NewRole, Tenant};
use miette::{IntoDiagnostic, Result};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Partner with its organizations and their projects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerDefinition {
    pub name: String,
    #[serde(default)]
    pub organizations: Vec<OrganizationDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationDefinition {
    pub name: String,
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Built-in role definition; seeded roles are protected from API updates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub name: String,
    pub partner: String,
    pub organization: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_global: bool,
    pub scope: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Root structure of the seed JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub partners: Vec<PartnerDefinition>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl SeedReport {
    fn record(&mut self, result: SyncResult) {
        match result {
            SyncResult::Created => self.created += 1,
            SyncResult::Updated => self.updated += 1,
            SyncResult::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

/// Load tenants, permission records and built-in roles from a JSON file (idempotent)
pub async fn sync_from_file(db: &DatabaseConnection, file_path: &Path) -> Result<SeedReport> {
    tracing::info!("Loading seed data from {}", file_path.display());

    let content = fs::read_to_string(file_path).into_diagnostic().map_err(|e| {
        miette::miette!("Failed to read seed file at '{}': {}", file_path.display(), e)
    })?;

    let seed: SeedFile = serde_json::from_str(&content).into_diagnostic().map_err(|e| {
        miette::miette!(
            "Failed to parse seed JSON file: {}\n\nExpected format:\n{{\n  \"partners\": [{{ \"name\": \"acme-partner\", \"organizations\": [{{ \"name\": \"acme\", \"projects\": [\"proj1\"] }}] }}],\n  \"permissions\": [{{ \"name\": \"cluster.read\", \"baseUrl\": \"/api/v1\", \"resourceUrls\": [{{ \"url\": \"/clusters\", \"methods\": [\"GET\"] }}], \"resourceActionUrls\": [] }}],\n  \"roles\": [{{ \"name\": \"viewer\", \"partner\": \"acme-partner\", \"organization\": \"acme\", \"scope\": \"organization\", \"permissions\": [\"cluster.read\"] }}]\n}}",
            e
        )
    })?;

    sync(db, &seed).await
}

pub async fn sync(db: &DatabaseConnection, seed: &SeedFile) -> Result<SeedReport> {
    tracing::info!(
        "Found {} partner(s), {} permission record(s), {} role(s)",
        seed.partners.len(),
        seed.permissions.len(),
        seed.roles.len()
    );

    let mut report = SeedReport::default();

    for partner in &seed.partners {
        sync_partner(db, partner, &mut report).await?;
    }

    for record in &seed.permissions {
        let changed = storage::upsert_permission(db, record).await.into_diagnostic()?;
        report.record(if changed {
            SyncResult::Created
        } else {
            SyncResult::Unchanged
        });
    }

    for role in &seed.roles {
        report.record(sync_role(db, role).await?);
    }

    tracing::info!(
        "Seed sync complete: {} created, {} updated, {} unchanged",
        report.created,
        report.updated,
        report.unchanged
    );

    Ok(report)
}

async fn sync_partner(
    db: &DatabaseConnection,
    def: &PartnerDefinition,
    report: &mut SeedReport,
) -> Result<()> {
    let partner = match storage::find_partner_by_name(db, &def.name).await.into_diagnostic()? {
        Some(p) => {
            report.record(SyncResult::Unchanged);
            p
        }
        None => {
            tracing::info!("Creating partner: {}", def.name);
            report.record(SyncResult::Created);
            storage::create_partner(db, &def.name).await.into_diagnostic()?
        }
    };

    for org_def in &def.organizations {
        let org = match storage::find_organization_by_name(db, &org_def.name, &partner.id)
            .await
            .into_diagnostic()?
        {
            Some(o) => {
                report.record(SyncResult::Unchanged);
                o
            }
            None => {
                tracing::info!("Creating organization: {}/{}", def.name, org_def.name);
                report.record(SyncResult::Created);
                storage::create_organization(db, &org_def.name, &partner.id)
                    .await
                    .into_diagnostic()?
            }
        };
        let tenant = Tenant {
            partner_id: partner.id.clone(),
            organization_id: org.id.clone(),
            organization: org.name.clone(),
        };

        for project in &org_def.projects {
            if storage::find_project_by_name(db, project, &org.id)
                .await
                .into_diagnostic()?
                .is_some()
            {
                report.record(SyncResult::Unchanged);
            } else {
                tracing::info!("Creating project: {}/{}", org_def.name, project);
                storage::create_project(db, project, &tenant)
                    .await
                    .into_diagnostic()?;
                report.record(SyncResult::Created);
            }
        }
    }
    Ok(())
}

/// Sync a single built-in role and its permission rows (idempotent)
async fn sync_role(db: &DatabaseConnection, def: &RoleDefinition) -> Result<SyncResult> {
    let scope = normalize_scope(&def.scope).into_diagnostic()?;
    let tenant = storage::resolve_tenant(db, &def.partner, &def.organization)
        .await
        .into_diagnostic()?;
    let permission_ids = storage::resolve_permission_ids(db, &def.permissions)
        .await
        .into_diagnostic()?;

    let existing = storage::find_role_in_tenant(db, &def.name, &tenant)
        .await
        .into_diagnostic()?;

    let txn = db.begin().await.into_diagnostic()?;
    let result = match existing {
        None => {
            tracing::info!("Creating built-in role: {}", def.name);
            let row = storage::insert_role(
                &txn,
                NewRole {
                    name: &def.name,
                    description: def.description.clone(),
                    is_global: def.is_global,
                    scope: &scope,
                    builtin: true,
                },
                &tenant,
            )
            .await
            .into_diagnostic()?;
            storage::replace_role_permissions(&txn, &row.id, &permission_ids)
                .await
                .into_diagnostic()?;
            SyncResult::Created
        }
        Some(row) if !row.builtin => {
            tracing::warn!(
                "Role {} exists and is not built-in; leaving it untouched",
                def.name
            );
            SyncResult::Unchanged
        }
        Some(row) => {
            let mut current = storage::role_permission_names(&txn, &row.id)
                .await
                .into_diagnostic()?;
            let mut wanted = def.permissions.clone();
            wanted.sort();
            wanted.dedup();
            current.sort();

            let attrs_match = row.scope == scope
                && row.is_global == def.is_global
                && row.description == def.description;

            if current == wanted && attrs_match {
                SyncResult::Unchanged
            } else {
                tracing::info!("Updating built-in role: {}", def.name);
                let role_id = row.id.clone();
                storage::update_role_row(&txn, row, def.description.clone(), def.is_global, &scope)
                    .await
                    .into_diagnostic()?;
                storage::replace_role_permissions(&txn, &role_id, &permission_ids)
                    .await
                    .into_diagnostic()?;
                SyncResult::Updated
            }
        }
    };
    txn.commit().await.into_diagnostic()?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::ResourceUrl;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn test_db() -> (DatabaseConnection, NamedTempFile) {
        use sea_orm_migration::MigratorTrait;

        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());
        let db = sea_orm::Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        (db, temp_file)
    }

    fn seed() -> SeedFile {
        SeedFile {
            partners: vec![PartnerDefinition {
                name: "acme-partner".into(),
                organizations: vec![OrganizationDefinition {
                    name: "acme".into(),
                    projects: vec!["proj1".into()],
                }],
            }],
            permissions: vec![PermissionRecord {
                name: "cluster.read".into(),
                base_url: "/api/v1".into(),
                resource_urls: vec![ResourceUrl {
                    url: "/clusters".into(),
                    methods: vec!["GET".into()],
                }],
                resource_action_urls: vec![],
            }],
            roles: vec![RoleDefinition {
                name: "viewer".into(),
                partner: "acme-partner".into(),
                organization: "acme".into(),
                description: None,
                is_global: false,
                scope: "organization".into(),
                permissions: vec!["cluster.read".into()],
            }],
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (db, _file) = test_db().await;

        let first = sync(&db, &seed()).await.expect("first sync");
        // partner, org, project, permission, role
        assert_eq!(first.created, 5);

        let second = sync(&db, &seed()).await.expect("second sync");
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 5);

        let tenant = storage::resolve_tenant(&db, "acme-partner", "acme").await.unwrap();
        let role = storage::find_role_in_tenant(&db, "viewer", &tenant)
            .await
            .unwrap()
            .expect("role seeded");
        assert!(role.builtin);
        assert_eq!(
            storage::role_permission_names(&db, &role.id).await.unwrap(),
            vec!["cluster.read".to_string()]
        );
    }

    #[tokio::test]
    async fn test_seed_updates_builtin_role_permissions() {
        let (db, _file) = test_db().await;
        sync(&db, &seed()).await.expect("first sync");

        let mut changed = seed();
        changed.permissions.push(PermissionRecord {
            name: "cluster.write".into(),
            base_url: "/api/v1".into(),
            resource_urls: vec![ResourceUrl {
                url: "/clusters".into(),
                methods: vec!["POST".into()],
            }],
            resource_action_urls: vec![],
        });
        changed.roles[0].permissions.push("cluster.write".into());

        let report = sync(&db, &changed).await.expect("second sync");
        assert_eq!(report.updated, 1);
    }

    #[tokio::test]
    async fn test_seed_from_file_rejects_unknown_permission() {
        let (db, _file) = test_db().await;
        let mut bad = seed();
        bad.roles[0].permissions = vec!["missing".into()];

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&bad).unwrap()).unwrap();

        let err = sync_from_file(&db, file.path()).await.unwrap_err();
        assert!(err.to_string().contains("unable to find role permission"));
    }
}
