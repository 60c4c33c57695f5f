use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use crew_core::instance::InstanceRecord;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use super::load_instance;
use crate::auth::Owner;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::reconciler;
use crate::state::AppState;

const SECRET_LEN: usize = 40;

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[derive(Deserialize)]
pub struct CreateInstanceBody {
    pub agent_id: String,
    pub target: String,
}

/// GET /api/instances: the caller's instances, as stored.
pub async fn list_instances(
    State(app): State<AppState>,
    owner: Owner,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = app.store.list(&owner.0).await?;
    Ok(Json(serde_json::json!(records)))
}

/// POST /api/instances: register an instance on a configured target.
///
/// The auth secret is returned once, here, and never serialized again.
pub async fn create_instance(
    State(app): State<AppState>,
    owner: Owner,
    ApiJson(body): ApiJson<CreateInstanceBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let agent_id = body.agent_id.trim();
    let target = body.target.trim();
    if agent_id.is_empty() {
        return Err(AppError::bad_request("agent_id is required"));
    }
    if app.config.target(target).is_none() {
        return Err(AppError::bad_request(format!("unknown target '{target}'")));
    }

    let secret = generate_secret();
    let record = InstanceRecord::new(&owner.0, agent_id, target, Some(secret.clone()));
    app.store.insert(&record).await?;
    info!(instance_id = %record.id, target_id = %target, "instance registered");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "instance": record,
            "auth_secret": secret,
        })),
    ))
}

/// GET /api/instances/{id}: detail view, reconciled against the target first.
pub async fn get_instance(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = load_instance(&app, &owner, &id).await?;
    let record = reconciler::refresh(&app, record).await;
    Ok(Json(serde_json::json!(record)))
}
