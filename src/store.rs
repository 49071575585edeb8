//! # Durable Key-Value Stores
//!
//! The persistence gateway writes whole JSON-encoded collections under a small
//! set of keys. Any store that can get, set and remove a string by key works.
//!
//! - [`SqliteStore`]: a single `kv` table in SQLite (feature `persistence`)
//! - [`MemoryStore`]: shared in-memory map with write accounting and failure
//!   injection, used by tests and as a fallback when no database is available

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "persistence")]
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Result, TrackerError};

/// Minimal durable key-value store contract.
///
/// Implementations are moved onto the persistence writer thread, so they must
/// be `Send`.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    writes: HashMap<String, usize>,
    removes: HashMap<String, usize>,
    fail_writes: usize,
}

/// In-memory store. Clones share the same contents, so a test can keep a
/// handle after giving one to the gateway.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner.lock().map_err(|_| TrackerError::Internal {
            message: "memory store lock poisoned".to_string(),
        })
    }

    /// Store a raw value without counting it as a write.
    pub fn seed(&self, key: &str, value: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.values.insert(key.to_string(), value.to_string());
        }
    }

    /// Raw stored value for a key.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().ok()?.values.get(key).cloned()
    }

    /// Number of successful `set` calls for a key.
    pub fn write_count(&self, key: &str) -> usize {
        self.lock()
            .map(|inner| inner.writes.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of `remove` calls for a key.
    pub fn remove_count(&self, key: &str) -> usize {
        self.lock()
            .map(|inner| inner.removes.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_writes = n;
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(TrackerError::StorageWriteFailed {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        inner.values.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.values.remove(key);
        *inner.removes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// Key-value store backed by a single SQLite table.
#[cfg(feature = "persistence")]
pub struct SqliteStore {
    db: Connection,
}

#[cfg(feature = "persistence")]
impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;
        Ok(())
    }
}

#[cfg(feature = "persistence")]
impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at)
             VALUES (?, ?, strftime('%s', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM kv WHERE key = ?", params![key])?;
        Ok(())
    }
}
