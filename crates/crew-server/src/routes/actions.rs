use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use crew_core::script::ResetPlan;
use crew_core::types::Action;
use crew_core::CrewError;
use crew_exec::{FastPoll, SubmitOptions};
use serde::Deserialize;
use tracing::{info, warn};

use super::commands::CommandResponse;
use super::load_instance;
use crate::auth::Owner;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::lifecycle::PowerOp;
use crate::reconciler;
use crate::state::AppState;

/// Remote timeout for the reset script; installs can be slow.
const RESET_TIMEOUT_SECS: u64 = 900;

#[derive(Deserialize)]
pub struct ActionBody {
    pub action: String,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub plan: Option<ResetPlan>,
}

/// POST /api/instances/{id}/actions
pub async fn run_action(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ActionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action: Action = body.action.trim().parse()?;
    let record = load_instance(&app, &owner, &id).await?;
    if record.status.is_terminated() && !action.allowed_when_terminated() {
        return Err(CrewError::InstanceTerminated(id).into());
    }
    let target = record.target.clone();

    match action {
        Action::Status => {
            let truth = reconciler::observe(&app, &record).await?;
            let record = reconciler::apply_ground_truth(&app, record, &truth).await;
            Ok(Json(serde_json::json!({
                "action": action,
                "power_state": truth.power,
                "self_report": truth.self_report,
                "instance": record,
            })))
        }

        Action::Start | Action::Stop | Action::Reboot | Action::Terminate => {
            let mut op = PowerOp::from_action(action)
                .ok_or_else(|| CrewError::InvalidAction(action.to_string()))?;
            if op == PowerOp::Reboot {
                let described = app.lifecycle.describe(&target).await?;
                if described.state.is_powered_off() {
                    op = PowerOp::Start;
                }
            }
            app.lifecycle.power(&target, op).await?;
            if let Some(next) = action.resulting_status() {
                app.store.update_status(&record.owner_id, record.id, next).await?;
            }
            info!(instance_id = %record.id, target_id = %target, action = %action, performed = op.as_str(), "power action accepted");

            let record = load_instance(&app, &owner, &id).await?;
            Ok(Json(serde_json::json!({
                "action": action,
                "performed": op.as_str(),
                "instance": record,
            })))
        }

        Action::Reset => {
            let plan = body.plan.unwrap_or_default();
            let script = app.composer.reset(&plan)?;
            let guard = app.locks.lock(&target).await;
            let opts = SubmitOptions {
                working_directory: None,
                timeout_secs: Some(RESET_TIMEOUT_SECS),
            };
            let command_id = app.dispatcher.submit_script(&target, script, opts).await?;
            info!(instance_id = %record.id, target_id = %target, command_id = %command_id, "reset started");

            // The lock is held until the reset finishes so no other mutation
            // interleaves with the rebuild.
            let poller = app.poller.clone();
            let waited_id = command_id.clone();
            tokio::spawn(async move {
                let _guard = guard;
                let max_wait = Duration::from_secs(RESET_TIMEOUT_SECS + 60);
                match poller.wait(&target, &waited_id, max_wait).await {
                    Ok(FastPoll::Done(r)) if r.succeeded() => {
                        info!(target_id = %target, command_id = %waited_id, "reset finished");
                    }
                    Ok(poll) => {
                        let r = poll.into_result();
                        warn!(target_id = %target, command_id = %waited_id, status = %r.status, stderr = %r.stderr.trim(), "reset did not succeed");
                    }
                    Err(e) => {
                        warn!(target_id = %target, command_id = %waited_id, error = %e, "lost track of reset");
                    }
                }
            });

            Ok(Json(serde_json::json!({
                "action": action,
                "command_id": command_id,
            })))
        }

        Action::InstallSkill => {
            let skill = body
                .skill
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::bad_request("skill is required"))?;
            let script = app.composer.install_skill(skill)?;
            let command_id = app
                .dispatcher
                .submit_script(&target, script, SubmitOptions::default())
                .await?;
            let poll = app.poller.fast_poll(&target, &command_id).await?;
            Ok(Json(serde_json::json!({
                "action": action,
                "skill": skill,
                "result": CommandResponse::from_fast_poll(command_id, poll),
            })))
        }
    }
}
