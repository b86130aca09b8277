//! SqliteStore: a KvStore persisted in a single SQLite table.
//!
//! Expiry is stored as unix milliseconds. Expired rows are filtered out of
//! every read and physically removed by [`SqliteStore::purge_expired`].

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

use super::traits::{key_hex, KvStore, StorageResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    expires_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_kv_expires_at
    ON kv(expires_at) WHERE expires_at IS NOT NULL;
"#;

/// Store backed by one SQLite connection.
///
/// Expired rows are never removed by reads; the owner must call
/// [`SqliteStore::purge_expired`] periodically to bound the table size.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete every row whose expiry has passed. Returns the number deleted.
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let purged = self.conn.lock().execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_millis()],
        )?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired rows from sqlite store");
        }
        Ok(purged)
    }

    /// Number of stored rows, expired or not.
    pub fn len(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl KvStore for SqliteStore {
    fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        if value.is_empty() {
            return Err(StorageError::EmptyValue { key: key_hex(key) });
        }
        let expires_at = ttl.and_then(expiry_millis);
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<usize> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed)
    }

    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        // substr() on a BLOB counts bytes.
        let removed = self.conn.lock().execute(
            "DELETE FROM kv WHERE substr(key, 1, ?1) = ?2",
            params![prefix.len() as i64, prefix],
        )?;
        Ok(removed)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM kv
             WHERE substr(key, 1, ?1) = ?2 AND (expires_at IS NULL OR expires_at > ?3)
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix.len() as i64, prefix, now_millis()], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry for a TTL; `None` (never expires) if it does not fit.
fn expiry_millis(ttl: Duration) -> Option<i64> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ms| now_millis().checked_add(ms))
}
