//! Bind CRUD operations
//!
//! Binds are insert/delete only. Uniqueness of the (author, target, kind)
//! triple is left to the UNIQUE index; callers never check before inserting.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::BinderError;
use crate::model::{Bind, EntityKey, EntityRef, RelationKind};

const BIND_COLUMNS: &str =
    "id, author_type, author_key, target_type, target_key, kind, created_at";

fn read_bind(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bind> {
    Ok(Bind {
        id: row.get(0)?,
        author: EntityRef::new(
            row.get::<_, String>(1)?,
            EntityKey::from_stored(row.get(2)?),
        ),
        target: EntityRef::new(
            row.get::<_, String>(3)?,
            EntityKey::from_stored(row.get(4)?),
        ),
        kind: RelationKind::from_stored(row.get(5)?),
        created_at: row.get(6)?,
    })
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert a bind, failing with `DuplicateBind` if the triple already exists
pub fn insert_bind(conn: &Connection, bind: &Bind) -> Result<(), BinderError> {
    let sql = "INSERT INTO binds (id, author_type, author_key, target_type, target_key, kind, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)";

    let result = conn.execute(
        sql,
        params![
            bind.id,
            bind.author.type_id,
            bind.author.key.as_str(),
            bind.target.type_id,
            bind.target.key.as_str(),
            bind.kind.as_str(),
            bind.created_at,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(BinderError::DuplicateBind {
            author: bind.author.to_string(),
            target: bind.target.to_string(),
            kind: bind.kind.to_string(),
        }),
        Err(e) => Err(BinderError::Database(format!("Failed to insert bind: {}", e))),
    }
}

/// Delete the bind for a triple, returning the removed row if there was one
pub fn delete_bind(
    conn: &Connection,
    author: &EntityRef,
    target: &EntityRef,
    kind: &RelationKind,
) -> Result<Option<Bind>, BinderError> {
    let sql = format!(
        "DELETE FROM binds
         WHERE author_type = ? AND author_key = ? AND target_type = ? AND target_key = ? AND kind = ?
         RETURNING {}",
        BIND_COLUMNS
    );

    conn.query_row(
        &sql,
        params![
            author.type_id,
            author.key.as_str(),
            target.type_id,
            target.key.as_str(),
            kind.as_str(),
        ],
        read_bind,
    )
    .optional()
    .map_err(|e| BinderError::Database(format!("Failed to delete bind: {}", e)))
}

/// Check whether a triple is bound
pub fn bind_exists(
    conn: &Connection,
    author: &EntityRef,
    target: &EntityRef,
    kind: &RelationKind,
) -> Result<bool, BinderError> {
    let sql = "SELECT EXISTS(
                   SELECT 1 FROM binds
                   WHERE author_type = ? AND author_key = ? AND target_type = ? AND target_key = ? AND kind = ?
               )";

    conn.query_row(
        sql,
        params![
            author.type_id,
            author.key.as_str(),
            target.type_id,
            target.key.as_str(),
            kind.as_str(),
        ],
        |row| row.get::<_, bool>(0),
    )
    .map_err(|e| BinderError::Database(format!("Failed to check bind: {}", e)))
}

/// List target keys bound by one author under one kind, for one target type
///
/// Ordered by creation so repeated listings are stable.
pub fn list_target_keys(
    conn: &Connection,
    author: &EntityRef,
    kind: &RelationKind,
    target_type: &str,
) -> Result<Vec<EntityKey>, BinderError> {
    let sql = "SELECT target_key FROM binds
               WHERE author_type = ? AND author_key = ? AND kind = ? AND target_type = ?
               ORDER BY created_at, rowid";

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| BinderError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(
            params![author.type_id, author.key.as_str(), kind.as_str(), target_type],
            |row| row.get::<_, String>(0),
        )
        .map_err(|e| BinderError::Database(format!("Failed to query binds: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let key = row.map_err(|e| BinderError::Database(format!("Failed to read row: {}", e)))?;
        results.push(EntityKey::from_stored(key));
    }

    Ok(results)
}
