//! # SQLite Key/Value Store
//!
//! Durable [`KeyValueStore`] backed by a single SQLite table. Values are opaque
//! blobs; the record cache decides what goes in them.
//!
//! Writes of several keys share one transaction, so the record list and its
//! pagination info are always replaced together.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use crate::cache::KeyValueStore;
use crate::error::Result;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE IF NOT EXISTS kv_cache (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )])
}

/// SQLite-backed key/value store.
pub struct SqliteStore {
    db: Mutex<Connection>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and bring its schema up to date.
    pub fn open(db_path: &str) -> Result<Self> {
        let mut db = Connection::open(db_path)?;
        migrations().to_latest(&mut db)?;
        info!("[SqliteStore] Opened cache database at {}", db_path);

        Ok(Self {
            db: Mutex::new(db),
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Number of stored keys.
    pub fn key_count(&self) -> Result<u64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM kv_cache", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .lock()
            .query_row(
                "SELECT value FROM kv_cache WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        let updated_at = chrono::Utc::now().timestamp();
        let mut db = self.lock();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )?;
            for (key, value) in entries {
                stmt.execute(params![key, value, updated_at])?;
            }
        }
        tx.commit()?;

        debug!(
            "[SqliteStore] Wrote {} keys ({} bytes)",
            entries.len(),
            entries.iter().map(|(_, v)| v.len()).sum::<usize>()
        );
        Ok(())
    }

    fn remove_all(&self, keys: &[String]) -> Result<()> {
        let mut db = self.lock();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM kv_cache WHERE key = ?1")?;
            for key in keys {
                stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
