//! Message repository: the append-only channel log

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::domain::envelope::Envelope;

/// Column list shared by every message SELECT ("from" is a SQL keyword)
const MESSAGE_COLUMNS: &str = r#"id, ts, "from", ch, type, v, body, files, reply_to"#;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    ts: f64,
    from: String,
    ch: String,
    #[sqlx(rename = "type")]
    kind: String,
    v: i64,
    body: String,
    files: String,
    reply_to: Option<String>,
}

impl From<MessageRow> for Envelope {
    fn from(row: MessageRow) -> Self {
        Envelope {
            id: row.id,
            ts: row.ts,
            from: row.from,
            ch: row.ch,
            kind: row.kind,
            v: row.v,
            body: serde_json::from_str(&row.body)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            files: serde_json::from_str(&row.files).unwrap_or_default(),
            reply_to: row.reply_to,
        }
    }
}

/// Append a message to the log. Envelopes are immutable; there is no update.
pub async fn insert_message(pool: &SqlitePool, env: &Envelope) -> Result<(), SqliteError> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, ts, "from", ch, type, v, body, files, reply_to)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&env.id)
    .bind(env.ts)
    .bind(&env.from)
    .bind(&env.ch)
    .bind(&env.kind)
    .bind(env.v)
    .bind(env.body.to_string())
    .bind(serde_json::to_string(&env.files).unwrap_or_else(|_| "[]".to_string()))
    .bind(&env.reply_to)
    .execute(pool)
    .await?;

    Ok(())
}

/// Recent messages on one channel, newest first
///
/// `since` filters to `id > since` (strict), `type_prefix` to types starting
/// with the given prefix.
pub async fn list_channel_messages(
    pool: &SqlitePool,
    ch: &str,
    since: Option<&str>,
    type_prefix: Option<&str>,
    limit: u32,
) -> Result<Vec<Envelope>, SqliteError> {
    let mut sql = format!("SELECT {} FROM messages WHERE ch = ?", MESSAGE_COLUMNS);
    if since.is_some() {
        sql.push_str(" AND id > ?");
    }
    if type_prefix.is_some() {
        sql.push_str(" AND type LIKE ?");
    }
    sql.push_str(" ORDER BY id DESC LIMIT ?");

    let mut query = sqlx::query_as::<_, MessageRow>(&sql).bind(ch);
    if let Some(since) = since {
        query = query.bind(since);
    }
    if let Some(prefix) = type_prefix {
        query = query.bind(format!("{}%", prefix));
    }
    let rows = query.bind(limit).fetch_all(pool).await?;

    Ok(rows.into_iter().map(Envelope::from).collect())
}

/// Recent messages across every channel, newest first
pub async fn list_all_messages(pool: &SqlitePool, limit: u32) -> Result<Vec<Envelope>, SqliteError> {
    let sql = format!("SELECT {} FROM messages ORDER BY id DESC LIMIT ?", MESSAGE_COLUMNS);
    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Envelope::from).collect())
}

/// Everything strictly after `since`, oldest first, for gap-recovery replay
///
/// `ch = None` replays the whole log (the all-channels stream).
pub async fn replay_messages(
    pool: &SqlitePool,
    ch: Option<&str>,
    since: &str,
) -> Result<Vec<Envelope>, SqliteError> {
    let rows = match ch {
        Some(ch) => {
            let sql = format!(
                "SELECT {} FROM messages WHERE ch = ? AND id > ? ORDER BY id ASC",
                MESSAGE_COLUMNS
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(ch)
                .bind(since)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM messages WHERE id > ? ORDER BY id ASC",
                MESSAGE_COLUMNS
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(since)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(Envelope::from).collect())
}

/// Distinct channel names that have ever seen a message
pub async fn list_channels(pool: &SqlitePool) -> Result<Vec<String>, SqliteError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT ch FROM messages ORDER BY ch")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(ch,)| ch).collect())
}

pub async fn count_messages(pool: &SqlitePool) -> Result<i64, SqliteError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Retention: drop messages older than the cutoff timestamp
pub async fn delete_messages_before(pool: &SqlitePool, cutoff: f64) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM messages WHERE ts < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
