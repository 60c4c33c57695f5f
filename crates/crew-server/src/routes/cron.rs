use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use crew_core::cron::NewCronJob;
use serde::Deserialize;

use super::load_active;
use crate::auth::Owner;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::remote;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddCronBody {
    pub schedule: String,
    pub command: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoveCronBody {
    /// The job line exactly as listed.
    pub raw: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Required to remove a system job such as the heartbeat.
    #[serde(default)]
    pub force: bool,
}

/// GET /api/instances/{id}/cron
pub async fn list_cron(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = load_active(&app, &owner, &id).await?;
    let jobs = remote::cron::list(&app, &record.target).await?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

/// POST /api/instances/{id}/cron
pub async fn add_cron(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AddCronBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let job = NewCronJob::new(&body.schedule, &body.command, body.name.as_deref())?;
    let record = load_active(&app, &owner, &id).await?;
    let added = remote::cron::add(&app, &record.target, &job).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "job": added })),
    ))
}

/// DELETE /api/instances/{id}/cron
pub async fn remove_cron(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RemoveCronBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = load_active(&app, &owner, &id).await?;
    let removed = remote::cron::remove(
        &app,
        &record.target,
        &body.raw,
        body.name.as_deref(),
        body.force,
    )
    .await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
