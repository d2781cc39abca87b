//! Database schema definitions

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::BinderError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// Runs under `BEGIN IMMEDIATE` so processes opening a fresh file at the same
/// time serialise on the write lock instead of both seeing version 0.
pub fn init_schema(conn: &Connection) -> Result<(), BinderError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| BinderError::Database(format!("Failed to begin schema init: {}", e)))?;
    let current_version = get_schema_version(&tx)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(&tx)?;
        set_schema_version(&tx, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(&tx, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    tx.commit()
        .map_err(|e| BinderError::Database(format!("Failed to commit schema init: {}", e)))
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, BinderError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| BinderError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| BinderError::Database(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), BinderError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| BinderError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| BinderError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), BinderError> {
    conn.execute_batch(BINDS_SCHEMA)
        .map_err(|e| BinderError::Database(format!("Failed to create binds table: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| BinderError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), BinderError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Binds table schema
const BINDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS binds (
    id TEXT PRIMARY KEY NOT NULL,

    -- Author reference (resolved from the principal, never from the payload)
    author_type TEXT NOT NULL,
    author_key TEXT NOT NULL,

    -- Target reference (validated against the registry at creation time only)
    target_type TEXT NOT NULL,
    target_key TEXT NOT NULL,

    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (author_type, author_key, target_type, target_key, kind)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_binds_author_kind_target_type
    ON binds (author_type, author_key, kind, target_type);
CREATE INDEX IF NOT EXISTS idx_binds_target
    ON binds (target_type, target_key);
"#;
