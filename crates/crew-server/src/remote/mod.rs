//! Short request/response round trips against a target: submit a composed
//! script, fast-poll it, and hand back the finished result.

pub mod cron;
pub mod files;

use crew_core::script::Script;
use crew_exec::{FastPoll, PollResult, SubmitOptions, UpstreamFailure};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Run `script` on `target` and wait for it within the fast-poll budget.
///
/// A command that is still running when the budget runs out is reported as
/// an upstream failure; it keeps running on the target.
pub async fn run_script(app: &AppState, target: &str, script: Script) -> Result<PollResult, AppError> {
    let command_id = app
        .dispatcher
        .submit_script(target, script, SubmitOptions::default())
        .await?;
    match app.poller.fast_poll(target, &command_id).await? {
        FastPoll::Done(result) => Ok(result),
        FastPoll::StillRunning(_) => {
            warn!(target_id = %target, command_id = %command_id, "remote command outlived the poll budget");
            Err(UpstreamFailure::generic("Remote command did not finish in time. Try again later.").into())
        }
    }
}

/// Log the remote stderr of a failed round trip and build the caller-safe error.
pub(crate) fn remote_failure(target: &str, what: &str, result: &PollResult) -> AppError {
    warn!(
        target_id = %target,
        status = %result.status,
        exit_code = ?result.exit_code,
        stderr = %result.stderr.trim(),
        "{what} failed"
    );
    UpstreamFailure::generic(format!("{what} failed")).into()
}
