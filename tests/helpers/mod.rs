pub mod builders;
pub mod db;
pub mod engine;

use std::sync::Arc;

use warden::authz::catalog::PermissionSource;
use warden::authz::{EngineModel, EnforcementGateway, PermissionCatalog, PolicyEngine};
use warden::relations::{LocalIdentityProvider, RelationManager};
use warden::storage::Tenant;

pub use builders::{GroupBuilder, RoleBuilder, UserBuilder};
pub use db::{seed_permissions, seed_tenant, TestDb, ORG, PARTNER, PROJECT};
pub use engine::FlakyEngine;

/// Database, engine, gateway and relation manager wired together
pub struct TestStack {
    pub db: TestDb,
    pub tenant: Tenant,
    pub engine: Arc<FlakyEngine>,
    pub gateway: Arc<EnforcementGateway>,
    pub identity: Arc<LocalIdentityProvider>,
    pub relations: RelationManager,
}

impl TestStack {
    /// Seeded tenant and permissions, role-scope engine model
    pub async fn new() -> Self {
        Self::with_model(EngineModel::RoleScope).await
    }

    pub async fn with_model(model: EngineModel) -> Self {
        let db = TestDb::new().await;
        let tenant = seed_tenant(db.connection()).await;
        seed_permissions(db.connection()).await;

        let engine = Arc::new(FlakyEngine::new(model).await);
        let gateway = Self::gateway_for(&db, engine.clone());
        let identity = Arc::new(LocalIdentityProvider::new());
        let relations = RelationManager::new(
            db.connection().clone(),
            gateway.clone(),
            identity.clone(),
        );

        Self {
            db,
            tenant,
            engine,
            gateway,
            identity,
            relations,
        }
    }

    /// A gateway over a fresh, empty engine reading the same database
    pub fn gateway_for(db: &TestDb, engine: Arc<dyn PolicyEngine>) -> Arc<EnforcementGateway> {
        let source: Arc<dyn PermissionSource> = Arc::new(db.connection().clone());
        Arc::new(EnforcementGateway::new(
            engine,
            Arc::new(PermissionCatalog::new(source)),
        ))
    }
}
