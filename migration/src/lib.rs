pub use sea_orm_migration::prelude::*;

mod m20250301_000001_tenancy_schema;
mod m20250301_000002_role_schema;
mod m20250301_000003_job_executions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_tenancy_schema::Migration),
            Box::new(m20250301_000002_role_schema::Migration),
            Box::new(m20250301_000003_job_executions::Migration),
        ]
    }
}
