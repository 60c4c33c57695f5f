use crew_core::script::FILE_MISSING_EXIT;
use crew_core::CrewError;
use serde::Serialize;
use tracing::info;

use super::{remote_failure, run_script};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    /// Absolute path on the target.
    pub path: String,
    pub content: String,
}

/// Read a file inside the agent root.
pub async fn read(app: &AppState, target: &str, path: &str) -> Result<RemoteFile, AppError> {
    let resolved = app.composer.layout().resolve_file_path(path)?;
    let result = run_script(app, target, app.composer.read_file(&resolved)).await?;
    if result.exit_code == Some(FILE_MISSING_EXIT) {
        return Err(CrewError::FileNotFound(path.to_string()).into());
    }
    if !result.succeeded() {
        return Err(remote_failure(target, "remote file read", &result));
    }
    Ok(RemoteFile {
        path: resolved,
        content: result.stdout,
    })
}

/// Replace a file inside the agent root. Writes to the same target are
/// serialized.
pub async fn write(
    app: &AppState,
    target: &str,
    path: &str,
    content: &str,
) -> Result<String, AppError> {
    let resolved = app.composer.layout().resolve_file_path(path)?;
    let limit = app.config.exec.max_file_bytes;
    if content.len() > limit {
        return Err(CrewError::FileTooLarge {
            len: content.len(),
            limit,
        }
        .into());
    }

    let _guard = app.locks.lock(target).await;
    let script = app.composer.write_file(&resolved, content.as_bytes());
    let result = run_script(app, target, script).await?;
    if !result.succeeded() {
        return Err(remote_failure(target, "remote file write", &result));
    }
    info!(target_id = %target, path = %resolved, bytes = content.len(), "remote file written");
    Ok(resolved)
}
