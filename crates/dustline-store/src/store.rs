//! SQLite key/value backend.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema;

/// Default quota, matching the per-origin budget of browser storage.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Options for opening a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum total size of all keys and values, in bytes (None = unlimited).
    pub quota_bytes: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
        }
    }
}

impl StoreOptions {
    /// Options without a quota.
    pub fn unlimited() -> Self {
        Self { quota_bytes: None }
    }

    /// Set the quota in bytes.
    #[must_use]
    pub fn quota_bytes(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }
}

/// SQLite-backed string key/value store.
pub struct Store {
    conn: Connection,
    options: StoreOptions,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .field("options", &self.options)
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    /// Open or create a database with explicit options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL lets several dashboard processes share the file; last writer wins.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn, options })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_options(StoreOptions::default())
    }

    /// Open an in-memory database with explicit options.
    pub fn open_in_memory_with_options(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn, options })
    }

    /// The options this store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Read the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// Fails with [`Error::QuotaExceeded`] when the total size of all stored
    /// entries, with this one replaced, would exceed the quota. The previous
    /// value is left untouched in that case.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.options.quota_bytes {
            let others = self.usage_excluding(key)?;
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;

        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Delete the value under `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(removed > 0)
    }

    /// List all stored keys.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Total bytes used by all keys and values.
    pub fn usage_bytes(&self) -> Result<usize> {
        self.usage_excluding("")
    }

    fn usage_excluding(&self, key: &str) -> Result<usize> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv WHERE key != ?",
            [key],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.usage_bytes().unwrap(), 0);
    }

    #[test]
    fn test_put_get_replace() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get("deviceStates").unwrap(), None);

        store.put("deviceStates", r#"{"Tool1":"ON"}"#).unwrap();
        store.put("deviceStates", r#"{"Tool1":"OFF"}"#).unwrap();

        assert_eq!(
            store.get("deviceStates").unwrap().as_deref(),
            Some(r#"{"Tool1":"OFF"}"#)
        );
        assert_eq!(store.keys().unwrap(), vec!["deviceStates".to_string()]);
    }

    #[test]
    fn test_remove() {
        let store = Store::open_in_memory().unwrap();
        store.put("simulationMode", "true").unwrap();
        assert!(store.remove("simulationMode").unwrap());
        assert!(!store.remove("simulationMode").unwrap());
        assert_eq!(store.get("simulationMode").unwrap(), None);
    }

    #[test]
    fn test_quota_exceeded_keeps_previous_value() {
        let store =
            Store::open_in_memory_with_options(StoreOptions::default().quota_bytes(32)).unwrap();

        store.put("k", "small").unwrap();
        let err = store.put("k", &"x".repeat(64)).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { quota: 32, .. }));

        assert_eq!(store.get("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn test_quota_counts_replaced_value_once() {
        let store =
            Store::open_in_memory_with_options(StoreOptions::default().quota_bytes(20)).unwrap();

        // 1 + 15 bytes; rewriting the same key must not count the old value.
        store.put("k", &"a".repeat(15)).unwrap();
        store.put("k", &"b".repeat(15)).unwrap();
        assert_eq!(store.usage_bytes().unwrap(), 16);
    }

    #[test]
    fn test_unlimited_quota() {
        let store = Store::open_in_memory_with_options(StoreOptions::unlimited()).unwrap();
        store.put("big", &"x".repeat(DEFAULT_QUOTA_BYTES + 1)).unwrap();
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");

        {
            let store = Store::open(&path).unwrap();
            store.put("chartData", r#"{"Tool1":{"ON":1}}"#).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(
            store.get("chartData").unwrap().as_deref(),
            Some(r#"{"Tool1":{"ON":1}}"#)
        );
    }
}
