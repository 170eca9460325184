//! In-memory cache backend.
//!
//! Process-local, nothing persisted. Used as the no-op choice when a
//! persistent store is unwanted (tests, one-shot runs).

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;

use super::{CacheEntry, CacheStatus, FrameCache};
use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CoreError::Cache("memory cache lock poisoned".to_string()))?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CoreError::Cache("memory cache lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<u64> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CoreError::Cache("memory cache lock poisoned".to_string()))?;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    fn status(&self) -> Result<CacheStatus> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(CacheStatus {
            backend: "memory".to_string(),
            connected: true,
            entry_count: entries.len() as u64,
            oldest: entries.values().map(|e| e.created_at).min(),
            newest: entries.values().map(|e| e.created_at).max(),
            bytes: entries.values().map(|e| e.value.len() as u64).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &[u8], created_at: i64) -> CacheEntry {
        CacheEntry {
            value: payload.to_vec(),
            version: 1,
            created_at,
        }
    }

    #[test]
    fn test_set_get_round_trip() {
        let cache = MemoryCache::new();
        let e = entry(b"hello", 10);
        cache.set("k", &e).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(e));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = MemoryCache::new();
        cache.set("k", &entry(b"one", 1)).unwrap();
        cache.set("k", &entry(b"two", 2)).unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap().value, b"two");
    }

    #[test]
    fn test_status_counts_entries_and_bytes() {
        let cache = MemoryCache::new();
        cache.set("a", &entry(b"xx", 5)).unwrap();
        cache.set("b", &entry(b"yyy", 9)).unwrap();
        let status = cache.status().unwrap();
        assert_eq!(status.entry_count, 2);
        assert_eq!(status.bytes, 5);
        assert_eq!(status.oldest, Some(5));
        assert_eq!(status.newest, Some(9));
        assert!(status.connected);
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let cache = MemoryCache::new();
        cache.set("a", &entry(b"x", 1)).unwrap();
        cache.set("b", &entry(b"y", 2)).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("a").unwrap().is_none());
    }
}
