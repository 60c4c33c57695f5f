pub mod actions;
pub mod commands;
pub mod cron;
pub mod files;
pub mod heartbeat;
pub mod instances;

use crew_core::instance::InstanceRecord;
use crew_core::CrewError;
use uuid::Uuid;

use crate::auth::Owner;
use crate::error::AppError;
use crate::state::AppState;

/// Load an instance owned by the caller. Unknown ids, malformed ids and
/// records owned by someone else are indistinguishable.
pub(crate) async fn load_instance(
    app: &AppState,
    owner: &Owner,
    id: &str,
) -> Result<InstanceRecord, AppError> {
    let not_found = || AppError::from(CrewError::InstanceNotFound(id.to_string()));
    let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
    app.store.get(&owner.0, uuid).await?.ok_or_else(not_found)
}

/// Like [`load_instance`], but refuses terminated instances.
pub(crate) async fn load_active(
    app: &AppState,
    owner: &Owner,
    id: &str,
) -> Result<InstanceRecord, AppError> {
    let record = load_instance(app, owner, id).await?;
    if record.status.is_terminated() {
        return Err(CrewError::InstanceTerminated(id.to_string()).into());
    }
    Ok(record)
}
