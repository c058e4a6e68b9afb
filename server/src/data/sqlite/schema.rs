//! SQLite schema definitions
//!
//! Initial schema with all tables. No migrations needed for first version.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL
);

-- =============================================================================
-- 1. Messages: the append-only channel log
-- =============================================================================
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    ts REAL NOT NULL,
    "from" TEXT NOT NULL CHECK(length("from") >= 1),
    ch TEXT NOT NULL CHECK(length(ch) >= 1),
    type TEXT NOT NULL CHECK(length(type) >= 1),
    v INTEGER NOT NULL DEFAULT 1,
    body TEXT NOT NULL DEFAULT '{}',
    files TEXT NOT NULL DEFAULT '[]',
    reply_to TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_ch ON messages(ch);
CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);
CREATE INDEX IF NOT EXISTS idx_messages_ch_type ON messages(ch, type);

-- =============================================================================
-- 2. Tasks
-- =============================================================================
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    created_at REAL NOT NULL,
    updated_at REAL NOT NULL,
    created_by TEXT NOT NULL CHECK(length(created_by) >= 1),
    assigned_to TEXT,
    claimed_by TEXT,
    claimed_at REAL,
    status TEXT NOT NULL DEFAULT 'open'
        CHECK(status IN ('open', 'claimed', 'done', 'abandoned')),
    title TEXT NOT NULL CHECK(length(title) >= 1),
    context TEXT NOT NULL DEFAULT '{}',
    result TEXT,
    files TEXT NOT NULL DEFAULT '[]',
    ch TEXT NOT NULL DEFAULT 'tasks'
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_ch ON tasks(ch);

-- =============================================================================
-- 3. Presence heartbeats
-- =============================================================================
CREATE TABLE IF NOT EXISTS presence (
    agent_id TEXT PRIMARY KEY,
    last_seen REAL NOT NULL,
    channels TEXT NOT NULL DEFAULT '[]',
    meta TEXT NOT NULL DEFAULT '{}'
);
"#;
