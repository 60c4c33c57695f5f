use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use crew_core::instance::Metrics;
use crew_core::types::InstanceStatus;
use serde::Deserialize;
use tracing::debug;

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<f64>,
    #[serde(default)]
    pub storage_bytes: Option<i64>,
}

/// POST /api/heartbeat: an instance reporting in with its own auth secret.
///
/// The body is optional. A terminated record stays terminated, and a
/// reported `terminated` status is ignored.
pub async fn heartbeat(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let secret = bearer_token(&headers).ok_or_else(|| AppError::unauthorized("missing instance secret"))?;
    let record = app
        .store
        .find_by_secret(secret)
        .await?
        .ok_or_else(|| AppError::unauthorized("unknown instance secret"))?;

    let payload: HeartbeatBody = if body.iter().all(u8::is_ascii_whitespace) {
        HeartbeatBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid heartbeat body: {e}")))?
    };

    // An instance cannot terminate itself by reporting it.
    let status = payload
        .status
        .as_deref()
        .map(InstanceStatus::normalize)
        .filter(|s| !s.is_terminated());
    let metrics = Metrics {
        cpu_percent: payload.cpu_percent,
        memory_mb: payload.memory_mb,
        storage_bytes: payload.storage_bytes,
    };
    let now = Utc::now();
    app.store
        .record_heartbeat(record.id, status, &metrics, now)
        .await?;
    debug!(instance_id = %record.id, status = ?status, "heartbeat");

    let current = if record.status.is_terminated() {
        record.status
    } else {
        status.unwrap_or(record.status)
    };
    Ok(Json(serde_json::json!({
        "ok": true,
        "status": current,
        "received_at": now,
    })))
}
