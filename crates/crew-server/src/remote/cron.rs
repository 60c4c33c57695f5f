//! Cron jobs live only in the target's crontab. Every edit reads the table,
//! changes it locally and writes it back with a compare-and-swap on the
//! content hash, under the per-target lock.

use crew_core::cron::{CronJob, CronTable, NewCronJob};
use crew_core::script::CRON_CONFLICT_EXIT;
use crew_core::CrewError;
use tracing::info;

use super::{remote_failure, run_script};
use crate::error::AppError;
use crate::state::AppState;

async fn read_table(app: &AppState, target: &str) -> Result<(String, CronTable), AppError> {
    let result = run_script(app, target, app.composer.read_crontab()).await?;
    if !result.succeeded() {
        return Err(remote_failure(target, "crontab read", &result));
    }
    let table = CronTable::parse(&result.stdout);
    Ok((result.stdout, table))
}

async fn write_table(
    app: &AppState,
    target: &str,
    based_on: &str,
    table: &CronTable,
) -> Result<(), AppError> {
    let script = app.composer.write_crontab(based_on, &table.render());
    let result = run_script(app, target, script).await?;
    if result.exit_code == Some(CRON_CONFLICT_EXIT) {
        return Err(CrewError::ConcurrentModification(format!(
            "crontab on {target} changed while it was being edited"
        ))
        .into());
    }
    if !result.succeeded() {
        return Err(remote_failure(target, "crontab write", &result));
    }
    Ok(())
}

pub async fn list(app: &AppState, target: &str) -> Result<Vec<CronJob>, AppError> {
    let (_, table) = read_table(app, target).await?;
    Ok(table.jobs(app.composer.heartbeat_marker()))
}

pub async fn add(app: &AppState, target: &str, job: &NewCronJob) -> Result<CronJob, AppError> {
    let _guard = app.locks.lock(target).await;
    let (raw, mut table) = read_table(app, target).await?;
    table.add(job);
    write_table(app, target, &raw, &table).await?;
    info!(target_id = %target, schedule = %job.schedule, "cron job added");

    let marker = app.composer.heartbeat_marker();
    Ok(table.find(&job.line(), marker).unwrap_or_else(|| CronJob {
        schedule: job.schedule.clone(),
        command: job.command.clone(),
        name: job.name.clone(),
        raw: job.line(),
        is_system: !marker.is_empty() && job.command.contains(marker),
    }))
}

/// Remove the job whose line equals `raw_line`. System jobs need `force`.
pub async fn remove(
    app: &AppState,
    target: &str,
    raw_line: &str,
    name: Option<&str>,
    force: bool,
) -> Result<usize, AppError> {
    if raw_line.trim().is_empty() {
        return Err(CrewError::InvalidCronJob("raw line is required".into()).into());
    }
    let _guard = app.locks.lock(target).await;
    let (raw, mut table) = read_table(app, target).await?;
    let job = table
        .find(raw_line, app.composer.heartbeat_marker())
        .ok_or_else(|| CrewError::CronJobNotFound(raw_line.to_string()))?;
    if job.is_system && !force {
        return Err(CrewError::SystemCronJob(job.raw).into());
    }
    let removed = table.remove(raw_line, name.or(job.name.as_deref()));
    write_table(app, target, &raw, &table).await?;
    info!(target_id = %target, removed, "cron job removed");
    Ok(removed)
}
