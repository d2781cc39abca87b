//! SQLite database module for bind storage
//!
//! ## Tables
//!
//! - `binds` - One row per (author, target, kind) triple, guarded by a
//!   composite UNIQUE index so concurrent inserts race safely, including
//!   across processes sharing the database file
//! - `schema_version` - Migration bookkeeping
//!
//! Entity tables named by `[[entity_types]]` in the config may live in the
//! same database; the registry only reads them.

pub mod binds;
pub mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::BinderError;

/// Default time a writer waits on a lock held by another connection
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Current UTC timestamp as ISO 8601 text, millisecond precision
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// SQLite database holding binds
pub struct BinderDb {
    conn: Mutex<Connection>,
}

impl BinderDb {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, BinderError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create the database file with a custom busy timeout
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, BinderError> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| BinderError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| BinderError::Database(format!("Failed to set busy timeout: {}", e)))?;
        // WAL lets readers proceed while another process writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| BinderError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, BinderError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            BinderError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), BinderError> {
        self.with_conn(schema::init_schema)
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, BinderError>
    where
        F: FnOnce(&Connection) -> Result<T, BinderError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BinderError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, BinderError> {
        self.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM binds", [], |row| row.get(0))
                .map_err(|e| BinderError::Database(format!("Query failed: {}", e)))?;

            let mut stmt = conn
                .prepare("SELECT kind, COUNT(*) FROM binds GROUP BY kind")
                .map_err(|e| BinderError::Database(format!("Failed to prepare statement: {}", e)))?;
            let by_kind = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(|e| BinderError::Database(format!("Query failed: {}", e)))?
                .map(|row| row.map(|(kind, count)| (kind, count as u64)))
                .collect::<Result<HashMap<_, _>, _>>()
                .map_err(|e| BinderError::Database(format!("Failed to read row: {}", e)))?;

            Ok(DbStats {
                bind_count: total as u64,
                by_kind,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub bind_count: u64,
    pub by_kind: HashMap<String, u64>,
}
