// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for display and log filters)
pub const APP_NAME: &str = "workshop";

// =============================================================================
// Environment Variables
// =============================================================================

/// Listen port
pub const ENV_PORT: &str = "WORKSHOP_PORT";

/// SQLite database file path
pub const ENV_DB_PATH: &str = "WORKSHOP_DB";

/// Blob directory path
pub const ENV_BLOB_DIR: &str = "WORKSHOP_BLOBS";

/// Message retention window in days
pub const ENV_RETENTION_DAYS: &str = "WORKSHOP_RETENTION_DAYS";

/// Verbose request logging toggle
pub const ENV_VERBOSE: &str = "WORKSHOP_VERBOSE";

/// Log level/filter
pub const ENV_LOG: &str = "WORKSHOP_LOG";

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_PORT: u16 = 4242;

pub const DEFAULT_DB_PATH: &str = "workshop.db";

pub const DEFAULT_BLOB_DIR: &str = "blobs";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;

// =============================================================================
// Streaming
// =============================================================================

/// Seconds between keepalive comment frames
pub const KEEPALIVE_INTERVAL_SECS: u64 = 20;

/// Per-subscriber frame buffer; a subscriber this far behind is evicted
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Conventional SSE resumption header carrying the last observed id
pub const RESUME_HEADER: &str = "last-event-id";

// =============================================================================
// History
// =============================================================================

/// Default `n` for per-channel history
pub const CHANNEL_HISTORY_DEFAULT_LIMIT: u32 = 200;

/// Default `n` for cross-channel history
pub const GLOBAL_HISTORY_DEFAULT_LIMIT: u32 = 100;

/// Hard cap on any history query
pub const HISTORY_MAX_LIMIT: u32 = 200;

// =============================================================================
// Presence
// =============================================================================

/// An agent is "live" while its last heartbeat is within this window
pub const PRESENCE_TTL_SECS: u64 = 60;

/// Presence rows older than this are removed by the retention loop
pub const PRESENCE_RETENTION_SECS: u64 = 7 * 86_400;

// =============================================================================
// Retention
// =============================================================================

/// Seconds between cleanup passes (first pass runs at startup)
pub const CLEANUP_INTERVAL_SECS: u64 = 3_600;

pub const SECS_PER_DAY: f64 = 86_400.0;

// =============================================================================
// Request Bodies
// =============================================================================

/// Cap on blob uploads
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Cap on every other request body
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// SQLite
// =============================================================================

/// Single connection: the store must serialize writes, claim read-backs
/// depend on it
pub const SQLITE_MAX_CONNECTIONS: u32 = 1;

pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Shutdown
// =============================================================================

/// Grace period for background tasks on shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
