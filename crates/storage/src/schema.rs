use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    tracing::debug!(version = SCHEMA_VERSION, "snapshot store schema ready");
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS projects (
    project_id BLOB PRIMARY KEY CHECK (length(project_id) = 16),
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stacks (
    project_id BLOB PRIMARY KEY REFERENCES projects(project_id) ON DELETE CASCADE,
    items BLOB NOT NULL,
    providers BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    updated_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subsystems (
    project_id BLOB NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    subsystem_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    additions BLOB NOT NULL,
    exclusions BLOB NOT NULL,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (project_id, subsystem_id)
);

CREATE TABLE IF NOT EXISTS drafts (
    project_id BLOB NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    user_sub TEXT NOT NULL,
    content BLOB NOT NULL,
    locked_by TEXT NOT NULL,
    locked_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (project_id, user_sub)
);

CREATE TABLE IF NOT EXISTS commits (
    rowid INTEGER PRIMARY KEY,
    commit_id BLOB NOT NULL UNIQUE CHECK (length(commit_id) = 16),
    project_id BLOB NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    message TEXT NOT NULL,
    author TEXT NOT NULL,
    author_sub TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    snapshot BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_commits_project ON commits (project_id, timestamp, rowid);
";
