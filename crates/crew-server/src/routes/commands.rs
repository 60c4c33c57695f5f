use axum::extract::{Path, Query, State};
use axum::Json;
use crew_exec::{FastPoll, InvocationStatus, PollResult, SubmitOptions};
use serde::{Deserialize, Serialize};

use super::{load_active, load_instance};
use crate::auth::Owner;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

const MSG_RUNNING: &str = "Command is still running. Poll again with its command_id.";
const MSG_NOT_INDEXED: &str = "Command is not visible yet. Poll again shortly.";

/// The single response shape for submitting and polling commands.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub found: bool,
    pub status: InvocationStatus,
    pub done: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn new(command_id: String, result: PollResult) -> Self {
        let done = result.done();
        let message = if !result.found {
            Some(MSG_NOT_INDEXED.to_string())
        } else if !done {
            Some(MSG_RUNNING.to_string())
        } else {
            None
        };
        Self {
            command_id,
            found: result.found,
            status: result.status,
            done,
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            message,
        }
    }

    pub fn from_fast_poll(command_id: String, poll: FastPoll) -> Self {
        Self::new(command_id, poll.into_result())
    }
}

#[derive(Deserialize)]
pub struct CommandBody {
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
pub struct CommandQuery {
    #[serde(default, alias = "commandId")]
    pub command_id: Option<String>,
}

/// POST /api/instances/{id}/command: submit, then wait briefly for the result.
pub async fn submit_command(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommandBody>,
) -> Result<Json<CommandResponse>, AppError> {
    let record = load_active(&app, &owner, &id).await?;
    let opts = SubmitOptions {
        working_directory: body.working_directory,
        timeout_secs: body.timeout_secs,
    };
    let command_id = app
        .dispatcher
        .submit(&record.target, &body.command, opts)
        .await?;
    let poll = app.poller.fast_poll(&record.target, &command_id).await?;
    Ok(Json(CommandResponse::from_fast_poll(command_id, poll)))
}

/// GET /api/instances/{id}/command?command_id=: one poll of an earlier command.
pub async fn get_command(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    Query(query): Query<CommandQuery>,
) -> Result<Json<CommandResponse>, AppError> {
    let command_id = query
        .command_id
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("command_id is required"))?;
    let record = load_instance(&app, &owner, &id).await?;
    let result = app.poller.poll(&record.target, &command_id).await?;
    Ok(Json(CommandResponse::new(command_id, result)))
}
