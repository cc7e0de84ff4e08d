use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};
use warden::authz::catalog::PermissionSource;
use warden::authz::{CasbinEngine, EnforcementGateway, PermissionCatalog, PolicyEngine};
use warden::relations::{LocalIdentityProvider, RelationManager};
use warden::{jobs, seed, settings, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Multi-tenant access-control policy layer"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    // seed tenants, permission records and built-in roles
    if let Some(file) = &settings.seed.file {
        seed::sync_from_file(&db, file).await?;
    }

    // evaluation engine and gateway
    let engine: Arc<dyn PolicyEngine> =
        Arc::new(CasbinEngine::new(settings.engine.model).await.into_diagnostic()?);
    let source: Arc<dyn PermissionSource> = Arc::new(db.clone());
    let catalog = Arc::new(PermissionCatalog::new(source));
    let gateway = Arc::new(EnforcementGateway::new(engine, catalog));
    tracing::info!(model = ?settings.engine.model, "Policy engine ready");

    // load the in-memory engine from the relational store
    if settings.reconcile.on_startup {
        jobs::run_reconcile(&db, &gateway, settings.reconcile.prune).await?;
    }

    // periodic reconcile
    let _scheduler = match &settings.reconcile.schedule {
        Some(schedule) => Some(
            jobs::init_scheduler(
                db.clone(),
                gateway.clone(),
                schedule,
                settings.reconcile.prune,
            )
            .await?,
        ),
        None => None,
    };

    let relations = Arc::new(RelationManager::new(
        db,
        gateway,
        Arc::new(LocalIdentityProvider::new()),
    ));

    // start web server
    web::serve(settings, relations).await?;
    Ok(())
}
