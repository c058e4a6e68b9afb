//! Task routes: the lifecycle state machine
//!
//! Every transition reads the current row, applies its guard, performs one
//! guarded UPDATE, and announces a lifecycle event on the task's channel.
//! The claim path is the only racy one: the UPDATE's `WHERE status='open'`
//! picks the winner and the read-back identifies it.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;

use crate::api::server::AppState;
use crate::api::types::{ApiError, parse_json_body};
use crate::data::sqlite::repositories::task::{self, Task, TaskFilter, TaskStatus};
use crate::domain::envelope::PublishRequest;
use crate::utils::{id, time};

const DEFAULT_TASK_CHANNEL: &str = "tasks";

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub ch: Option<String>,
}

/// Body shared by the transition endpoints
#[derive(Debug, Deserialize)]
pub struct TaskActionRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

impl TaskActionRequest {
    fn require_from(&self) -> Result<(), ApiError> {
        if self.from.is_empty() {
            return Err(ApiError::bad_request("missing 'from'"));
        }
        Ok(())
    }
}

/// POST /tasks
pub async fn create(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: CreateTaskRequest = parse_json_body(&body)?;

    if req.title.is_empty() {
        return Err(ApiError::bad_request("missing 'title'"));
    }
    let creator = if req.created_by.is_empty() {
        req.from.clone()
    } else {
        req.created_by.clone()
    };
    if creator.is_empty() {
        return Err(ApiError::bad_request("missing 'from'"));
    }

    let now = time::now_secs();
    let new_task = Task {
        id: id::mint(),
        created_at: now,
        updated_at: now,
        created_by: creator.clone(),
        assigned_to: req.assigned_to.filter(|a| !a.is_empty()),
        claimed_by: None,
        claimed_at: None,
        status: TaskStatus::Open,
        title: req.title,
        context: req
            .context
            .unwrap_or_else(|| Value::Object(Default::default())),
        result: None,
        files: vec![],
        ch: req
            .ch
            .filter(|ch| !ch.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_CHANNEL.to_string()),
    };

    task::insert_task(state.db.pool(), &new_task)
        .await
        .map_err(ApiError::from_sqlite)?;
    announce(&state, &new_task, &creator, "task.created", Value::Null, vec![]).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": new_task.id })),
    ))
}

/// GET /tasks/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let found = fetch(&state, &task_id).await?;
    Ok(Json(found))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    /// Matches either `assigned_to` or `claimed_by` (documented OR)
    #[serde(rename = "for")]
    pub for_agent: Option<String>,
    pub assigned: Option<String>,
    pub claimed: Option<String>,
}

/// GET /tasks
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => match TaskStatus::parse(s) {
            Some(status) => Some(status),
            // Exact-match semantics: an unknown status matches nothing
            None => return Ok(Json(vec![])),
        },
        None => None,
    };

    let filter = TaskFilter {
        status,
        agent: query.for_agent,
        assigned: query.assigned,
        claimed: query.claimed,
    };
    let tasks = task::list_tasks(state.db.pool(), &filter)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(tasks))
}

/// POST /tasks/{id}/claim
pub async fn claim(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: TaskActionRequest = parse_json_body(&body)?;
    req.require_from()?;

    let current = fetch(&state, &task_id).await?;
    if current.status != TaskStatus::Open {
        return Err(ApiError::conflict(format!(
            "task not open (status: {})",
            current.status
        )));
    }

    // Only the UPDATE that still observes 'open' mutates the row; the
    // read-back below deterministically names the winner.
    task::claim_task(state.db.pool(), &task_id, &req.from, time::now_secs())
        .await
        .map_err(ApiError::from_sqlite)?;

    let claimed = fetch(&state, &task_id).await?;
    if claimed.claimed_by.as_deref() != Some(req.from.as_str()) {
        return Err(ApiError::conflict("lost claim race"));
    }

    announce(&state, &claimed, &req.from, "task.claimed", Value::Null, vec![]).await?;

    Ok(Json(serde_json::json!({
        "id": claimed.id,
        "status": claimed.status,
        "claimed-by": claimed.claimed_by,
    })))
}

/// POST /tasks/{id}/update: progress note; bumps `updated_at`, no other
/// column changes
pub async fn update(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: TaskActionRequest = parse_json_body(&body)?;
    req.require_from()?;

    let current = fetch(&state, &task_id).await?;
    task::touch_task(state.db.pool(), &task_id, time::now_secs())
        .await
        .map_err(ApiError::from_sqlite)?;

    let extra = match &req.note {
        Some(note) => serde_json::json!({ "note": note }),
        None => Value::Null,
    };
    announce(&state, &current, &req.from, "task.updated", extra, vec![]).await?;

    Ok(Json(serde_json::json!({ "id": current.id })))
}

/// POST /tasks/{id}/done
pub async fn done(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: TaskActionRequest = parse_json_body(&body)?;
    req.require_from()?;

    let current = fetch(&state, &task_id).await?;
    check_claimant(&current, &req.from)?;

    let files = req.files.unwrap_or_default();
    let affected = task::complete_task(
        state.db.pool(),
        &task_id,
        req.result.as_ref(),
        &files,
        time::now_secs(),
    )
    .await
    .map_err(ApiError::from_sqlite)?;
    if affected == 0 {
        return Err(ApiError::conflict("task not claimed"));
    }

    let extra = match &req.result {
        Some(result) => serde_json::json!({ "result": result }),
        None => Value::Null,
    };
    announce(&state, &current, &req.from, "task.done", extra, files).await?;

    Ok(Json(serde_json::json!({
        "id": current.id,
        "status": TaskStatus::Done,
    })))
}

/// POST /tasks/{id}/abandon: back to open, claim cleared
pub async fn abandon(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: TaskActionRequest = parse_json_body(&body)?;
    req.require_from()?;

    let current = fetch(&state, &task_id).await?;
    check_claimant(&current, &req.from)?;

    let affected = task::abandon_task(state.db.pool(), &task_id, time::now_secs())
        .await
        .map_err(ApiError::from_sqlite)?;
    if affected == 0 {
        return Err(ApiError::conflict("task not claimed"));
    }

    let extra = match &req.reason {
        Some(reason) => serde_json::json!({ "reason": reason }),
        None => Value::Null,
    };
    announce(&state, &current, &req.from, "task.abandoned", extra, vec![]).await?;

    Ok(Json(serde_json::json!({
        "id": current.id,
        "status": TaskStatus::Open,
    })))
}

/// POST /tasks/{id}/interrupt: a signal, no state change
pub async fn interrupt(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: TaskActionRequest = parse_json_body(&body)?;
    req.require_from()?;

    let current = fetch(&state, &task_id).await?;

    let extra = match &req.reason {
        Some(reason) => serde_json::json!({ "reason": reason }),
        None => Value::Null,
    };
    announce(&state, &current, &req.from, "task.interrupt", extra, vec![]).await?;

    Ok(Json(serde_json::json!({
        "id": current.id,
        "signalled": true,
    })))
}

async fn fetch(state: &AppState, task_id: &str) -> Result<Task, ApiError> {
    task::get_task(state.db.pool(), task_id)
        .await
        .map_err(ApiError::from_sqlite)?
        .ok_or_else(|| ApiError::not_found("task not found"))
}

/// done/abandon guard: must be claimed, and only by the caller
fn check_claimant(current: &Task, from: &str) -> Result<(), ApiError> {
    if current.status != TaskStatus::Claimed {
        return Err(ApiError::conflict(format!(
            "task not claimed (status: {})",
            current.status
        )));
    }
    if current.claimed_by.as_deref() != Some(from) {
        return Err(ApiError::forbidden("task claimed by another agent"));
    }
    Ok(())
}

/// Emit a lifecycle event on the task's channel via the publish pipeline
async fn announce(
    state: &AppState,
    subject: &Task,
    from: &str,
    kind: &str,
    extra: Value,
    files: Vec<String>,
) -> Result<(), ApiError> {
    let mut body = serde_json::json!({
        "task-id": subject.id,
        "title": subject.title,
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }

    let event = PublishRequest {
        from: from.to_string(),
        kind: kind.to_string(),
        body,
        files,
        ..Default::default()
    };
    state
        .channels
        .publish(&subject.ch, event)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(())
}
