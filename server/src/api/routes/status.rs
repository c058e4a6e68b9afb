//! Status route: counts and uptime

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::core::constants::PRESENCE_TTL_SECS;
use crate::data::sqlite::repositories::{message, presence, task};
use crate::utils::time;

/// GET /status
pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.db.pool();

    let messages = message::count_messages(pool)
        .await
        .map_err(ApiError::from_sqlite)?;
    let tasks = task::count_tasks(pool)
        .await
        .map_err(ApiError::from_sqlite)?;
    let channels = message::list_channels(pool)
        .await
        .map_err(ApiError::from_sqlite)?
        .len();
    let agents = presence::list_live(pool, time::now_secs() - PRESENCE_TTL_SECS as f64)
        .await
        .map_err(ApiError::from_sqlite)?
        .len();

    Ok(Json(serde_json::json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "messages": messages,
        "tasks": tasks,
        "channels": channels,
        "agents": agents,
        "connections": state.registry.connection_count(),
    })))
}
