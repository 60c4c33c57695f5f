use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::load_active;
use crate::auth::Owner;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::remote;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Deserialize)]
pub struct WriteFileBody {
    pub path: String,
    pub content: String,
}

/// GET /api/instances/{id}/files?path=
pub async fn read_file(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<remote::files::RemoteFile>, AppError> {
    let record = load_active(&app, &owner, &id).await?;
    let file = remote::files::read(&app, &record.target, &query.path).await?;
    Ok(Json(file))
}

/// PUT /api/instances/{id}/files
pub async fn write_file(
    State(app): State<AppState>,
    owner: Owner,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<WriteFileBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = load_active(&app, &owner, &id).await?;
    let path = remote::files::write(&app, &record.target, &body.path, &body.content).await?;
    Ok(Json(serde_json::json!({ "path": path, "written": true })))
}
