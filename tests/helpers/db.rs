use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;
use warden::authz::types::{PermissionRecord, ResourceUrl};
use warden::storage::{self, Tenant};

pub const PARTNER: &str = "acme-partner";
pub const ORG: &str = "acme";
pub const PROJECT: &str = "proj1";

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Create the `acme-partner/acme` tenant with project `proj1`
pub async fn seed_tenant(db: &DatabaseConnection) -> Tenant {
    let partner = storage::create_partner(db, PARTNER)
        .await
        .expect("Failed to create partner");
    storage::create_organization(db, ORG, &partner.id)
        .await
        .expect("Failed to create organization");
    let tenant = storage::resolve_tenant(db, PARTNER, ORG)
        .await
        .expect("Failed to resolve tenant");
    storage::create_project(db, PROJECT, &tenant)
        .await
        .expect("Failed to create project");
    tenant
}

pub fn permission(name: &str, base_url: &str, url: &str, methods: &[&str]) -> PermissionRecord {
    PermissionRecord {
        name: name.to_string(),
        base_url: base_url.to_string(),
        resource_urls: vec![ResourceUrl {
            url: url.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        }],
        resource_action_urls: vec![],
    }
}

/// `cluster.read` (GET /api/v1/clusters) and `cluster.write` (POST /api/v1/clusters)
pub async fn seed_permissions(db: &DatabaseConnection) {
    for record in [
        permission("cluster.read", "/api/v1", "/clusters", &["GET"]),
        permission("cluster.write", "/api/v1", "/clusters", &["POST"]),
    ] {
        storage::upsert_permission(db, &record)
            .await
            .expect("Failed to create permission");
    }
}
