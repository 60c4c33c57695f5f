//! Fetches ground truth for an instance and persists the correction computed
//! by [`crew_core::reconcile::reconcile`].

use crew_core::instance::InstanceRecord;
use crew_core::reconcile::{reconcile, GroundTruth, SelfReport};
use crew_exec::{ExecError, FastPoll};
use tracing::{debug, warn};

use crate::lifecycle::TargetDescription;
use crate::state::AppState;

/// Ask the target for its self-report. Any failure yields `None`.
async fn fetch_self_report(app: &AppState, target: &str) -> Option<SelfReport> {
    let command_id = match app
        .dispatcher
        .submit_script(target, app.composer.status_report(), Default::default())
        .await
    {
        Ok(id) => id,
        Err(e) => {
            debug!(target_id = %target, error = %e, "self-report not submitted");
            return None;
        }
    };
    let result = match app.poller.fast_poll(target, &command_id).await {
        Ok(FastPoll::Done(r)) if r.succeeded() => r,
        Ok(other) => {
            debug!(target_id = %target, done = other.is_done(), "self-report unavailable");
            return None;
        }
        Err(e) => {
            debug!(target_id = %target, error = %e, "self-report poll failed");
            return None;
        }
    };
    match SelfReport::parse(&result.stdout) {
        Ok(report) => Some(report),
        Err(e) => {
            debug!(target_id = %target, error = %e, "self-report unparseable");
            None
        }
    }
}

/// Gather ground truth: power state always, self-report while powered on.
pub async fn observe(app: &AppState, record: &InstanceRecord) -> Result<GroundTruth, ExecError> {
    let TargetDescription { state, address } = app.lifecycle.describe(&record.target).await?;
    let self_report = if state.is_powered_on() {
        fetch_self_report(app, &record.target).await
    } else {
        None
    };
    Ok(GroundTruth {
        power: state,
        address,
        self_report,
    })
}

/// Reconcile against already-observed ground truth and persist the result.
pub async fn apply_ground_truth(
    app: &AppState,
    mut record: InstanceRecord,
    truth: &GroundTruth,
) -> InstanceRecord {
    let correction = reconcile(&record, truth);
    if correction.is_empty() {
        return record;
    }
    if let Err(e) = app.store.apply_correction(&record.owner_id, record.id, &correction).await {
        warn!(instance_id = %record.id, error = %e, "failed to persist reconciled status");
        return record;
    }
    debug!(
        instance_id = %record.id,
        from = %record.status,
        to = ?correction.status,
        "instance reconciled"
    );
    correction.apply(&mut record);
    record
}

/// Best-effort refresh: on any failure the record is returned unchanged.
pub async fn refresh(app: &AppState, record: InstanceRecord) -> InstanceRecord {
    if record.status.is_terminated() {
        return record;
    }
    match observe(app, &record).await {
        Ok(truth) => apply_ground_truth(app, record, &truth).await,
        Err(e) => {
            warn!(instance_id = %record.id, target_id = %record.target, error = %e, "reconciliation skipped");
            record
        }
    }
}
