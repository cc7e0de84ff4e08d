use std::sync::Arc;

use crate::authz::service::EnforcementGateway;
use crate::entities;
use crate::errors::WardenError;
use crate::relations::reconcile::{self, ReconcileReport};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const RECONCILE_JOB: &str = "reconcile_engine";

/// Initialize and start the job scheduler with the periodic reconcile job
pub async fn init_scheduler(
    db: DatabaseConnection,
    authz: Arc<EnforcementGateway>,
    schedule: &str,
    prune: bool,
) -> Result<JobScheduler, WardenError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| WardenError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let reconcile_job = Job::new_async(schedule, move |_uuid, _l| {
        let db = db.clone();
        let authz = authz.clone();
        Box::pin(async move {
            info!("Running {} job", RECONCILE_JOB);
            if let Err(e) = run_reconcile(&db, &authz, prune).await {
                error!("Failed to record {} job: {}", RECONCILE_JOB, e);
            }
        })
    })
    .map_err(|e| WardenError::Other(format!("Failed to create reconcile job: {}", e)))?;

    sched
        .add(reconcile_job)
        .await
        .map_err(|e| WardenError::Other(format!("Failed to add reconcile job: {}", e)))?;

    // Start the scheduler
    sched
        .start()
        .await
        .map_err(|e| WardenError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!(schedule, "Job scheduler started");

    Ok(sched)
}

/// Run one reconcile pass and record it in `job_executions`.
///
/// A failed pass is recorded, not returned; only bookkeeping failures are errors.
pub async fn run_reconcile(
    db: &DatabaseConnection,
    authz: &EnforcementGateway,
    prune: bool,
) -> Result<Option<ReconcileReport>, WardenError> {
    let execution_id = start_job_execution(db, RECONCILE_JOB).await?;

    match reconcile::reconcile(db, authz, prune).await {
        Ok(report) => {
            info!(
                "{} completed: {} added, {} removed",
                RECONCILE_JOB, report.added, report.removed
            );
            complete_job_execution(db, execution_id, true, None, Some(report.total() as i64))
                .await?;
            Ok(Some(report))
        }
        Err(e) => {
            error!("{} failed: {}", RECONCILE_JOB, e);
            complete_job_execution(db, execution_id, false, Some(e.to_string()), None).await?;
            Ok(None)
        }
    }
}

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, WardenError> {
    use entities::job_execution;

    let now = Utc::now().timestamp();

    let execution = job_execution::ActiveModel {
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
        ..Default::default()
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), WardenError> {
    use entities::job_execution::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Most recent executions of a job, newest first
pub async fn recent_executions(
    db: &DatabaseConnection,
    job_name: &str,
    limit: u64,
) -> Result<Vec<entities::job_execution::Model>, WardenError> {
    use entities::job_execution::{Column, Entity};
    use sea_orm::QuerySelect;

    Ok(Entity::find()
        .filter(Column::JobName.eq(job_name))
        .order_by_desc(Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

/// Manually trigger a job by name (useful for admin API)
pub async fn trigger_job_manually(
    db: &DatabaseConnection,
    authz: &EnforcementGateway,
    job_name: &str,
    prune: bool,
) -> Result<Option<ReconcileReport>, WardenError> {
    info!("Manually triggering job: {}", job_name);
    match job_name {
        RECONCILE_JOB => run_reconcile(db, authz, prune).await,
        _ => Err(WardenError::UnknownJob(job_name.to_string())),
    }
}
