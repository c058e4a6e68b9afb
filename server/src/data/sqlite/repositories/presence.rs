//! Presence repository: heartbeat upserts and the live window

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;

/// One agent's latest heartbeat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceRow {
    pub agent_id: String,
    pub last_seen: f64,
    pub channels: Vec<String>,
    pub meta: Value,
}

#[derive(sqlx::FromRow)]
struct RawRow {
    agent_id: String,
    last_seen: f64,
    channels: String,
    meta: String,
}

impl From<RawRow> for PresenceRow {
    fn from(row: RawRow) -> Self {
        PresenceRow {
            agent_id: row.agent_id,
            last_seen: row.last_seen,
            channels: serde_json::from_str(&row.channels).unwrap_or_default(),
            meta: serde_json::from_str(&row.meta)
                .unwrap_or_else(|_| Value::Object(Default::default())),
        }
    }
}

/// Record a heartbeat, overwriting any previous row for the agent
pub async fn upsert_presence(
    pool: &SqlitePool,
    agent_id: &str,
    last_seen: f64,
    channels: &[String],
    meta: &Value,
) -> Result<(), SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO presence (agent_id, last_seen, channels, meta)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(agent_id) DO UPDATE SET
            last_seen = excluded.last_seen,
            channels = excluded.channels,
            meta = excluded.meta
        "#,
    )
    .bind(agent_id)
    .bind(last_seen)
    .bind(serde_json::to_string(channels).unwrap_or_else(|_| "[]".to_string()))
    .bind(meta.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Agents whose heartbeat is newer than `cutoff`
pub async fn list_live(pool: &SqlitePool, cutoff: f64) -> Result<Vec<PresenceRow>, SqliteError> {
    let rows = sqlx::query_as::<_, RawRow>(
        "SELECT agent_id, last_seen, channels, meta FROM presence \
         WHERE last_seen > ? ORDER BY agent_id",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PresenceRow::from).collect())
}

/// Retention: drop rows for agents not seen since `cutoff`
pub async fn delete_presence_before(pool: &SqlitePool, cutoff: f64) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM presence WHERE last_seen < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
