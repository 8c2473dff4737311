//! SQLite implementation of the DurableCache trait.
//!
//! Records are stored as JSON dumps keyed by item key, with version and
//! parent key broken out for inspection. rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use itemsync_core::{ItemKey, Record, RecordDump};

use crate::cache::DurableCache;
use crate::error::{Result, StoreError};
use crate::migration;

/// SQLite-based durable cache.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl DurableCache for SqliteCache {
    async fn persist(&self, records: &[Record]) -> Result<()> {
        let rows: Vec<(String, i64, Option<String>, String)> = records
            .iter()
            .filter_map(|record| {
                let key = record.key()?;
                Some((key, record))
            })
            .map(|(key, record)| -> Result<(String, i64, Option<String>, String)> {
                let version = i64::try_from(record.version().0).map_err(|_| {
                    StoreError::InvalidData(format!(
                        "version {} of {key} exceeds the storable range",
                        record.version()
                    ))
                })?;
                let dump = serde_json::to_string(&record.dump())?;
                Ok((
                    key.to_string(),
                    version,
                    record.parent_key().map(ItemKey::to_string),
                    dump,
                ))
            })
            .collect::<Result<_>>()?;

        if rows.is_empty() {
            return Ok(());
        }

        let count = rows.len();
        self.run_blocking(move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO items (item_key, version, parent_key, dump, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(item_key) DO UPDATE SET
                        version = excluded.version,
                        parent_key = excluded.parent_key,
                        dump = excluded.dump,
                        updated_at = excluded.updated_at",
                )?;
                for (key, version, parent, dump) in &rows {
                    stmt.execute(params![key, version, parent, dump, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        tracing::debug!(count, "persisted items to sqlite cache");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Record>> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare("SELECT dump FROM items ORDER BY item_key")?;
            let dumps = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            dumps
                .iter()
                .map(|json| {
                    let dump: RecordDump = serde_json::from_str(json)
                        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                    Ok(Record::from_dump(dump))
                })
                .collect()
        })
        .await
    }

    async fn remove(&self, keys: &[ItemKey]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(ItemKey::to_string).collect();
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM items WHERE item_key = ?1")?;
                for key in &keys {
                    stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.run_blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
