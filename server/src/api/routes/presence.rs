//! Presence routes: heartbeats and the live-agent listing

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::api::server::AppState;
use crate::api::types::{ApiError, parse_json_body};
use crate::core::constants::PRESENCE_TTL_SECS;
use crate::data::sqlite::repositories::presence::{self, PresenceRow};
use crate::utils::time;

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// POST /presence
pub async fn heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: HeartbeatRequest = parse_json_body(&body)?;
    if req.agent_id.is_empty() {
        return Err(ApiError::bad_request("missing 'agent_id'"));
    }

    let meta = req
        .meta
        .unwrap_or_else(|| Value::Object(Default::default()));
    presence::upsert_presence(
        state.db.pool(),
        &req.agent_id,
        time::now_secs(),
        &req.channels,
        &meta,
    )
    .await
    .map_err(ApiError::from_sqlite)?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /presence: agents heard from within the TTL window
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<PresenceRow>>, ApiError> {
    let cutoff = time::now_secs() - PRESENCE_TTL_SECS as f64;
    let live = presence::list_live(state.db.pool(), cutoff)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(live))
}
