use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Key-value store on top of SQLite
///
/// Values are stored as JSON. An entry with a TTL is treated as missing
/// once it expires and is removed the next time it is read.
pub struct CacheManager {
    conn: Mutex<Connection>,
}

impl CacheManager {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        debug!("Opened cache at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway cache, mostly for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                expires_at INTEGER
            )",
            [],
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn();
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at.is_some_and(|at| at <= now_millis()) {
            debug!("Cache entry {} expired", key);
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&value)?))
    }

    /// Store a value, replacing whatever was there. `None` never expires.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let now = now_millis();
        let expires_at =
            ttl.map(|ttl| now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)));

        self.conn().execute(
            "INSERT OR REPLACE INTO entries (key, value, stored_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, json, now, expires_at],
        )?;
        Ok(())
    }

    /// Returns whether there was anything to delete
    pub fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// Drop every expired entry, returning how many went
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_millis()],
        )?;
        Ok(removed)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    #[test]
    fn test_set_get_delete() {
        let cache = CacheManager::in_memory().unwrap();
        let entry = Entry {
            name: "wallet".into(),
            count: 3,
        };

        assert_eq!(cache.get::<Entry>("k").unwrap(), None);
        cache.set("k", &entry, None).unwrap();
        assert_eq!(cache.get::<Entry>("k").unwrap(), Some(entry));

        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert_eq!(cache.get::<Entry>("k").unwrap(), None);
    }

    #[test]
    fn test_set_replaces() {
        let cache = CacheManager::in_memory().unwrap();
        cache.set("k", &1u32, None).unwrap();
        cache.set("k", &2u32, None).unwrap();
        assert_eq!(cache.get::<u32>("k").unwrap(), Some(2));
    }

    #[test]
    fn test_expired_entries_are_gone() {
        let cache = CacheManager::in_memory().unwrap();
        cache.set("stale", &"x", Some(Duration::ZERO)).unwrap();
        cache.set("fresh", &"y", Some(Duration::from_secs(3600))).unwrap();
        cache.set("old", &"z", Some(Duration::ZERO)).unwrap();

        assert_eq!(cache.get::<String>("stale").unwrap(), None);
        assert_eq!(cache.get::<String>("fresh").unwrap().as_deref(), Some("y"));
        assert_eq!(cache.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let cache = CacheManager::in_memory().unwrap();
        cache.set("k", &"text", None).unwrap();
        assert!(matches!(
            cache.get::<u32>("k"),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        CacheManager::new(&path)
            .unwrap()
            .set("summary", &"hello", None)
            .unwrap();

        let reopened = CacheManager::new(&path).unwrap();
        assert_eq!(reopened.get::<String>("summary").unwrap().as_deref(), Some("hello"));
    }
}
