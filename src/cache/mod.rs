//! Caching services.
//!
//! - [`TtlCache`]: process-wide concurrent map with time-based validity
//! - [`ResponseStore`]: persistent SQLite key/value store for rewrite responses
//! - [`compute_hash`] / [`hash_text`]: content addressing for keys and fingerprints
//!
//! # ResponseStore design
//!
//! - Simple key-value store with JSON values and a creation timestamp
//! - TTL applied on read; `purge_older_than` deletes stale rows
//! - Versioned - auto-clears on version mismatch
//!
//! # Key Format
//!
//! ```text
//! {sha256(prompt)}    -> "rewritten text"   (empty string = gave up after retries)
//! ```

mod hash;
mod ttl;

pub use hash::{compute_hash, hash_text};
pub use ttl::TtlCache;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

/// Current store schema version. Bump this when the format changes.
const CACHE_VERSION: i32 = 1;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Entry count and payload size of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: usize,
}

/// SQLite-backed persistent key/value store.
pub struct ResponseStore {
    conn: Connection,
}

impl ResponseStore {
    /// Open or create the store at `path`, creating parent directories.
    ///
    /// If the stored version doesn't match, all entries are cleared.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    /// Default location: `<cache dir>/xmlbridge/responses.db`.
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("xmlbridge").join("responses.db"))
    }

    fn init(&self) -> CacheResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(_) => {
                self.clear_all()?;
                self.set_version()?;
            }
            None => self.set_version()?,
        }

        Ok(())
    }

    fn set_version(&self) -> CacheResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Get a value, ignoring entries older than `max_age`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        max_age: Option<Duration>,
    ) -> CacheResult<Option<T>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT value, created_at FROM cache WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, created_at)) = row else {
            return Ok(None);
        };
        if let Some(max_age) = max_age {
            if now() - created_at > max_age.as_secs() as i64 {
                return Ok(None);
            }
        }
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Set a value, replacing any existing entry.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO cache (key, value, created_at) VALUES (?, ?, ?)",
            params![key, json, now()],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    /// Delete entries older than `max_age`.
    pub fn purge_older_than(&self, max_age: Duration) -> CacheResult<usize> {
        let cutoff = now() - max_age.as_secs() as i64;
        let rows = self
            .conn
            .execute("DELETE FROM cache WHERE created_at < ?", params![cutoff])?;
        Ok(rows)
    }

    /// Clear all cache entries (but keep metadata).
    pub fn clear_all(&self) -> CacheResult<()> {
        self.conn.execute("DELETE FROM cache", [])?;
        Ok(())
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        let entry_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;

        let total_size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM cache",
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
        })
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, seconds: i64) -> CacheResult<()> {
        self.conn.execute(
            "UPDATE cache SET created_at = created_at - ? WHERE key = ?",
            params![seconds, key],
        )?;
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
