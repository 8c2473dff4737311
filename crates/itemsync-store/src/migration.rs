//! Schema migrations for the SQLite item cache.
//!
//! The schema version lives in SQLite's `user_version` pragma. Each
//! migration moves the schema from version N to N+1 inside one transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the schema up to [`CURRENT_VERSION`]. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "cache schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
        }
        tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
        tx.commit()?;
        tracing::info!(from = current, to = CURRENT_VERSION, "migrated item cache schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Cached items: one row per item key
        CREATE TABLE items (
            item_key TEXT PRIMARY KEY,        -- server identity
            version INTEGER NOT NULL,         -- last server version
            parent_key TEXT,                  -- parent item, nullable
            dump TEXT NOT NULL,               -- JSON record dump
            updated_at INTEGER NOT NULL       -- local timestamp of last write (Unix ms)
        );

        CREATE INDEX idx_items_parent ON items(parent_key);
        "#,
    )?;

    Ok(())
}
