//! Task repository
//!
//! The claim UPDATE carries `WHERE status = 'open'` so that of any number of
//! concurrent claimants only the one that observed `open` mutates the row;
//! callers re-read afterwards to learn who won.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Claimed,
    Done,
    Abandoned,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Done => "done",
            TaskStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TaskStatus::Open),
            "claimed" => Some(TaskStatus::Claimed),
            "done" => Some(TaskStatus::Done),
            "abandoned" => Some(TaskStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<f64>,
    pub status: TaskStatus,
    pub title: String,
    pub context: Value,
    pub result: Option<Value>,
    pub files: Vec<String>,
    pub ch: String,
}

/// Filters for task listing
#[derive(Debug, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    /// Matches `assigned_to` OR `claimed_by` (the `for` query parameter)
    pub agent: Option<String>,
    pub assigned: Option<String>,
    pub claimed: Option<String>,
}

const TASK_COLUMNS: &str = "id, created_at, updated_at, created_by, assigned_to, claimed_by, \
                            claimed_at, status, title, context, result, files, ch";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    created_at: f64,
    updated_at: f64,
    created_by: String,
    assigned_to: Option<String>,
    claimed_by: Option<String>,
    claimed_at: Option<f64>,
    status: String,
    title: String,
    context: String,
    result: Option<String>,
    files: String,
    ch: String,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
            status: TaskStatus::parse(&row.status).unwrap_or(TaskStatus::Open),
            title: row.title,
            context: serde_json::from_str(&row.context)
                .unwrap_or_else(|_| Value::Object(Default::default())),
            result: row
                .result
                .and_then(|r| serde_json::from_str(&r).ok()),
            files: serde_json::from_str(&row.files).unwrap_or_default(),
            ch: row.ch,
        }
    }
}

pub async fn insert_task(pool: &SqlitePool, task: &Task) -> Result<(), SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO tasks (id, created_at, updated_at, created_by, assigned_to, claimed_by,
                           claimed_at, status, title, context, result, files, ch)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.id)
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(&task.created_by)
    .bind(&task.assigned_to)
    .bind(&task.claimed_by)
    .bind(task.claimed_at)
    .bind(task.status.as_str())
    .bind(&task.title)
    .bind(task.context.to_string())
    .bind(task.result.as_ref().map(|r| r.to_string()))
    .bind(serde_json::to_string(&task.files).unwrap_or_else(|_| "[]".to_string()))
    .bind(&task.ch)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_task(pool: &SqlitePool, id: &str) -> Result<Option<Task>, SqliteError> {
    let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Task::from))
}

/// List tasks, newest first
pub async fn list_tasks(pool: &SqlitePool, filter: &TaskFilter) -> Result<Vec<Task>, SqliteError> {
    let mut sql = format!("SELECT {} FROM tasks WHERE 1=1", TASK_COLUMNS);
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if filter.agent.is_some() {
        sql.push_str(" AND (assigned_to = ? OR claimed_by = ?)");
    }
    if filter.assigned.is_some() {
        sql.push_str(" AND assigned_to = ?");
    }
    if filter.claimed.is_some() {
        sql.push_str(" AND claimed_by = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, TaskRow>(&sql);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(agent) = &filter.agent {
        query = query.bind(agent).bind(agent);
    }
    if let Some(assigned) = &filter.assigned {
        query = query.bind(assigned);
    }
    if let Some(claimed) = &filter.claimed {
        query = query.bind(claimed);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(Task::from).collect())
}

/// Guarded claim: only the UPDATE that observes `open` mutates the row
///
/// Returns the number of rows affected (0 = lost the race or not open).
pub async fn claim_task(
    pool: &SqlitePool,
    id: &str,
    agent: &str,
    now: f64,
) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'claimed', claimed_by = ?, claimed_at = ?, updated_at = ? \
         WHERE id = ? AND status = 'open'",
    )
    .bind(agent)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Bump `updated_at` without touching any other column
pub async fn touch_task(pool: &SqlitePool, id: &str, now: f64) -> Result<u64, SqliteError> {
    let result = sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Guarded completion: only valid from `claimed`
pub async fn complete_task(
    pool: &SqlitePool,
    id: &str,
    result_value: Option<&Value>,
    files: &[String],
    now: f64,
) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'done', result = ?, files = ?, updated_at = ? \
         WHERE id = ? AND status = 'claimed'",
    )
    .bind(result_value.map(|r| r.to_string()))
    .bind(serde_json::to_string(files).unwrap_or_else(|_| "[]".to_string()))
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Guarded release: back to `open`, claim columns cleared
pub async fn abandon_task(pool: &SqlitePool, id: &str, now: f64) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'open', claimed_by = NULL, claimed_at = NULL, updated_at = ? \
         WHERE id = ? AND status = 'claimed'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_tasks(pool: &SqlitePool) -> Result<i64, SqliteError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::SqliteService;

    fn task(id: &str, created_at: f64) -> Task {
        Task {
            id: id.to_string(),
            created_at,
            updated_at: created_at,
            created_by: "creator".to_string(),
            assigned_to: None,
            claimed_by: None,
            claimed_at: None,
            status: TaskStatus::Open,
            title: "do the thing".to_string(),
            context: serde_json::json!({}),
            result: None,
            files: vec![],
            ch: "tasks".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let db = SqliteService::memory().await;
        let t = Task {
            assigned_to: Some("a1".to_string()),
            context: serde_json::json!({"repo": "x"}),
            ..task("T1", 10.0)
        };
        insert_task(db.pool(), &t).await.unwrap();

        let got = get_task(db.pool(), "T1").await.unwrap().unwrap();
        assert_eq!(got, t);

        assert!(get_task(db.pool(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_guard_only_fires_once() {
        let db = SqliteService::memory().await;
        insert_task(db.pool(), &task("T1", 1.0)).await.unwrap();

        let first = claim_task(db.pool(), "T1", "a1", 2.0).await.unwrap();
        let second = claim_task(db.pool(), "T1", "a2", 2.0).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let got = get_task(db.pool(), "T1").await.unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Claimed);
        assert_eq!(got.claimed_by.as_deref(), Some("a1"));
        assert_eq!(got.claimed_at, Some(2.0));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let db = SqliteService::memory().await;
        insert_task(db.pool(), &task("T1", 1.0)).await.unwrap();

        let (a, b) = tokio::join!(
            claim_task(db.pool(), "T1", "a1", 2.0),
            claim_task(db.pool(), "T1", "a2", 2.0),
        );
        let affected = a.unwrap() + b.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn test_complete_requires_claimed() {
        let db = SqliteService::memory().await;
        insert_task(db.pool(), &task("T1", 1.0)).await.unwrap();

        // Not claimed yet: guard blocks
        let affected = complete_task(db.pool(), "T1", None, &[], 2.0).await.unwrap();
        assert_eq!(affected, 0);

        claim_task(db.pool(), "T1", "a1", 2.0).await.unwrap();
        let result = serde_json::json!({"ok": true});
        let files = vec!["sha256:abc".to_string()];
        let affected = complete_task(db.pool(), "T1", Some(&result), &files, 3.0)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let got = get_task(db.pool(), "T1").await.unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Done);
        assert_eq!(got.result, Some(result));
        assert_eq!(got.files, files);
        // Claim columns preserved for audit
        assert_eq!(got.claimed_by.as_deref(), Some("a1"));
        assert!(got.claimed_at.is_some());
    }

    #[tokio::test]
    async fn test_abandon_clears_claim_columns() {
        let db = SqliteService::memory().await;
        insert_task(db.pool(), &task("T1", 1.0)).await.unwrap();
        claim_task(db.pool(), "T1", "a1", 2.0).await.unwrap();

        let affected = abandon_task(db.pool(), "T1", 3.0).await.unwrap();
        assert_eq!(affected, 1);

        let got = get_task(db.pool(), "T1").await.unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Open);
        assert!(got.claimed_by.is_none());
        assert!(got.claimed_at.is_none());
        assert_eq!(got.updated_at, 3.0);

        // Re-claimable after release
        assert_eq!(claim_task(db.pool(), "T1", "a2", 4.0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = SqliteService::memory().await;
        insert_task(
            db.pool(),
            &Task {
                assigned_to: Some("a1".to_string()),
                ..task("T1", 1.0)
            },
        )
        .await
        .unwrap();
        insert_task(db.pool(), &task("T2", 2.0)).await.unwrap();
        claim_task(db.pool(), "T2", "a1", 3.0).await.unwrap();
        insert_task(db.pool(), &task("T3", 4.0)).await.unwrap();

        // Newest first
        let all = list_tasks(db.pool(), &TaskFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["T3", "T2", "T1"]
        );

        // `for` semantics: assigned OR claimed
        let for_a1 = list_tasks(
            db.pool(),
            &TaskFilter {
                agent: Some("a1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(
            for_a1.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["T2", "T1"]
        );

        // Combined with status
        let open_a1 = list_tasks(
            db.pool(),
            &TaskFilter {
                status: Some(TaskStatus::Open),
                agent: Some("a1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(open_a1.len(), 1);
        assert_eq!(open_a1[0].id, "T1");

        // Exact single-column filters
        let assigned = list_tasks(
            db.pool(),
            &TaskFilter {
                assigned: Some("a1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, "T1");

        let claimed = list_tasks(
            db.pool(),
            &TaskFilter {
                claimed: Some("a1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "T2");
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            TaskStatus::Open,
            TaskStatus::Claimed,
            TaskStatus::Done,
            TaskStatus::Abandoned,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }
}
