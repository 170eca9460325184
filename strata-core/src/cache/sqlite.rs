//! SQLite cache backend.
//!
//! One table, key-addressed, `INSERT OR REPLACE` for last-writer-wins.
//! A single connection behind a mutex is enough: contention is per-key and
//! rare, and reads are sub-millisecond against the warm page cache.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheEntry, CacheStatus, FrameCache};
use crate::error::CoreError;

pub struct SqliteCache {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache database: {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS frames (
                key        TEXT PRIMARY KEY,
                version    INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                value      BLOB NOT NULL
            );",
        )
        .context("failed to create cache schema")?;
        Ok(SqliteCache {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Cache("sqlite cache lock poisoned".to_string()).into())
    }
}

impl FrameCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value, version, created_at FROM frames WHERE key = ?1",
            params![key],
            |row| {
                Ok(CacheEntry {
                    value: row.get(0)?,
                    version: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .context("cache read failed")
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO frames (key, version, created_at, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, entry.version, entry.created_at, entry.value],
        )
        .context("cache write failed")?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM frames WHERE key = ?1", params![key])
            .context("cache delete failed")?;
        Ok(())
    }

    fn clear(&self) -> Result<u64> {
        let conn = self.lock()?;
        let dropped = conn
            .execute("DELETE FROM frames", [])
            .context("cache clear failed")?;
        Ok(dropped as u64)
    }

    fn status(&self) -> Result<CacheStatus> {
        let conn = self.lock()?;
        let (entry_count, oldest, newest, bytes) = conn
            .query_row(
                "SELECT COUNT(*), MIN(created_at), MAX(created_at), COALESCE(SUM(LENGTH(value)), 0)
                 FROM frames",
                [],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, u64>(3)?,
                    ))
                },
            )
            .context("cache status query failed")?;
        Ok(CacheStatus {
            backend: format!("sqlite ({})", self.path.display()),
            connected: true,
            entry_count,
            oldest,
            newest,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(&dir.path().join("cache.sqlite")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_set_get_round_trip() {
        let (_dir, cache) = open_temp();
        let entry = CacheEntry {
            value: vec![1, 2, 3],
            version: 1,
            created_at: 42,
        };
        cache.set("k", &entry).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(entry));
    }

    #[test]
    fn test_get_missing_key() {
        let (_dir, cache) = open_temp();
        assert!(cache.get("absent").unwrap().is_none());
    }

    #[test]
    fn test_last_writer_wins() {
        let (_dir, cache) = open_temp();
        cache
            .set(
                "k",
                &CacheEntry {
                    value: vec![1],
                    version: 1,
                    created_at: 1,
                },
            )
            .unwrap();
        cache
            .set(
                "k",
                &CacheEntry {
                    value: vec![2],
                    version: 1,
                    created_at: 2,
                },
            )
            .unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap().value, vec![2]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cache.sqlite");
        {
            let cache = SqliteCache::open(&db_path).unwrap();
            cache
                .set(
                    "k",
                    &CacheEntry {
                        value: vec![7],
                        version: 1,
                        created_at: 9,
                    },
                )
                .unwrap();
        }
        let cache = SqliteCache::open(&db_path).unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap().value, vec![7]);
    }

    #[test]
    fn test_status_reflects_contents() {
        let (_dir, cache) = open_temp();
        cache
            .set(
                "a",
                &CacheEntry {
                    value: vec![0; 10],
                    version: 1,
                    created_at: 3,
                },
            )
            .unwrap();
        cache
            .set(
                "b",
                &CacheEntry {
                    value: vec![0; 4],
                    version: 1,
                    created_at: 8,
                },
            )
            .unwrap();
        let status = cache.status().unwrap();
        assert_eq!(status.entry_count, 2);
        assert_eq!(status.bytes, 14);
        assert_eq!(status.oldest, Some(3));
        assert_eq!(status.newest, Some(8));
    }

    #[test]
    fn test_clear_empties_table() {
        let (_dir, cache) = open_temp();
        cache
            .set(
                "a",
                &CacheEntry {
                    value: vec![1],
                    version: 1,
                    created_at: 1,
                },
            )
            .unwrap();
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.status().unwrap().entry_count, 0);
    }
}
