//! Retention loop
//!
//! Deletes messages past the configured retention window and presence rows
//! not heard from in a week. Runs once at startup, then hourly. Failures are
//! logged and retried next tick; blobs are never touched.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{CLEANUP_INTERVAL_SECS, PRESENCE_RETENTION_SECS, SECS_PER_DAY};
use crate::data::sqlite::repositories::{message, presence};
use crate::data::sqlite::SqliteService;
use crate::utils::time;

pub fn start_retention_task(
    db: Arc<SqliteService>,
    retention_days: u32,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick fires immediately: cleanup runs once on startup
        let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("retention task shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    run_cleanup(&db, retention_days).await;
                }
            }
        }
    })
}

/// One cleanup pass. Never fails the caller.
pub async fn run_cleanup(db: &SqliteService, retention_days: u32) {
    let now = time::now_secs();

    let message_cutoff = now - retention_days as f64 * SECS_PER_DAY;
    match message::delete_messages_before(db.pool(), message_cutoff).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(deleted = n, "expired messages removed"),
        Err(e) => tracing::warn!("message cleanup failed: {}", e),
    }

    let presence_cutoff = now - PRESENCE_RETENTION_SECS as f64;
    match presence::delete_presence_before(db.pool(), presence_cutoff).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(deleted = n, "stale presence rows removed"),
        Err(e) => tracing::warn!("presence cleanup failed: {}", e),
    }
}
