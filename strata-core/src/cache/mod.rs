//! Versioned key-value cache for aggregate frames.
//!
//! Cache key: `SHA-256(schema || "|" || head || "|" || start || "|" || end
//! || "|" || filter)`, hex-lowercase, where start/end are the truncated
//! window bounds in epoch seconds. The key schema is bit-exact so caches can
//! be shared across implementations.
//!
//! Values are zstd-compressed JSON. A version mismatch on read is a miss; a
//! corrupt value triggers a one-shot delete at the key. Read failures degrade
//! to misses and write failures are logged; the cache is never fatal.
//!
//! Warm runs skip aggregation entirely; this is the primary performance
//! lever (~30x on repositories where `git log` dominates).

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::aggregate::AggregateFrame;
use crate::window::Window;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

/// Version stamp written with every cache value.
pub const CACHE_VALUE_VERSION: u32 = 1;

/// A stored value with its version and write timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub version: u32,
    pub created_at: i64,
}

/// Observability snapshot of a cache backend.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatus {
    pub backend: String,
    pub connected: bool,
    pub entry_count: u64,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
    pub bytes: u64,
}

/// Key-value contract the engine consumes.
///
/// Writes are last-writer-wins per key; reads return the most recent write
/// or a miss. No cross-key consistency is required. Implementations must
/// support concurrent readers and writers.
pub trait FrameCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    /// Remove all entries; returns how many were dropped.
    fn clear(&self) -> Result<u64>;
    fn status(&self) -> Result<CacheStatus>;
}

/// Shared cache handle, built once at program start and threaded explicitly.
pub type CacheHandle = Arc<dyn FrameCache>;

/// Configured cache backend.
///
/// SQLite and memory ship in-tree. The MySQL/PostgreSQL kinds are part of
/// the configuration surface (connection strings are validated at load),
/// but their drivers live outside this crate; hosts supply their own
/// [`FrameCache`] for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Sqlite(std::path::PathBuf),
    Memory,
    MySql(String),
    Postgres(String),
}

/// Build the cache handle for a backend choice.
///
/// Call once at program start and thread the handle explicitly; there is no
/// hidden global.
pub fn open(backend: &CacheBackend) -> Result<CacheHandle> {
    match backend {
        CacheBackend::Sqlite(path) => Ok(Arc::new(SqliteCache::open(path)?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::MySql(_) | CacheBackend::Postgres(_) => {
            Err(crate::error::CoreError::Config(
                "mysql/postgres cache backends require a host-supplied FrameCache implementation"
                    .to_string(),
            )
            .into())
        }
    }
}

/// Compute the cache key for an aggregation.
///
/// `window` must already be truncated; callers that pass an untruncated
/// window would silently fragment the cache, so this truncates again
/// (idempotent) rather than trusting the input.
pub fn cache_key(
    provider_schema_version: u32,
    repo_head_hash: &str,
    window: Window,
    normalized_path_filter: &str,
) -> String {
    let window = window.truncate();
    let mut hasher = Sha256::new();
    hasher.update(provider_schema_version.to_string());
    hasher.update("|");
    hasher.update(repo_head_hash);
    hasher.update("|");
    hasher.update(window.start.to_string());
    hasher.update("|");
    hasher.update(window.end.to_string());
    hasher.update("|");
    hasher.update(normalized_path_filter);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

fn encode_frame(frame: &AggregateFrame) -> Result<Vec<u8>> {
    let json = serde_json::to_string(frame).context("failed to serialize aggregate frame")?;
    zstd::encode_all(json.as_bytes(), 3).context("failed to compress aggregate frame")
}

fn decode_frame(bytes: &[u8]) -> Result<AggregateFrame> {
    let json = zstd::decode_all(bytes).context("failed to decompress aggregate frame")?;
    serde_json::from_slice(&json).context("failed to parse aggregate frame")
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Read a frame, applying the miss-on-error policy.
///
/// Returns `None` for: missing key, backend error (logged), version
/// mismatch, or corrupt value (logged, entry deleted).
pub fn load_frame(cache: &dyn FrameCache, key: &str) -> Option<AggregateFrame> {
    let entry = match cache.get(key) {
        Ok(Some(entry)) => entry,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("cache read failed (treating as miss): {:#}", e);
            return None;
        }
    };
    if entry.version != CACHE_VALUE_VERSION {
        return None;
    }
    match decode_frame(&entry.value) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::warn!("corrupt cache value at {} (deleting): {:#}", key, e);
            if let Err(del) = cache.delete(key) {
                log::warn!("failed to delete corrupt cache entry: {:#}", del);
            }
            None
        }
    }
}

/// Write a frame; failures are logged, never propagated.
pub fn store_frame(cache: &dyn FrameCache, key: &str, frame: &AggregateFrame) {
    let value = match encode_frame(frame) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("failed to encode aggregate frame for cache: {:#}", e);
            return;
        }
    };
    let entry = CacheEntry {
        value,
        version: CACHE_VALUE_VERSION,
        created_at: now_epoch(),
    };
    if let Err(e) = cache.set(key, &entry) {
        log::warn!("cache write failed (continuing uncached): {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FileAggregate;
    use std::collections::BTreeMap;

    fn sample_frame() -> AggregateFrame {
        let mut files = BTreeMap::new();
        files.insert(
            "src/lib.rs".to_string(),
            FileAggregate {
                commits: 3,
                churn: 42,
                contributors: BTreeMap::from([("alice".to_string(), 2), ("bob".to_string(), 1)]),
                first_seen: 7200,
                recent_commits: 1,
                recent_churn: 10,
            },
        );
        AggregateFrame {
            window: Window::new(3600, 86_400).unwrap(),
            files,
        }
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key(1, "abc", Window::new(3600, 7200).unwrap(), "");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_truncates_window() {
        let exact = cache_key(1, "abc", Window::new(3600, 7200).unwrap(), "src/");
        let skewed = cache_key(1, "abc", Window::new(3601, 7201).unwrap(), "src/");
        assert_eq!(exact, skewed);
    }

    #[test]
    fn test_key_varies_by_component() {
        let base = cache_key(1, "abc", Window::new(3600, 7200).unwrap(), "");
        assert_ne!(base, cache_key(2, "abc", Window::new(3600, 7200).unwrap(), ""));
        assert_ne!(base, cache_key(1, "abd", Window::new(3600, 7200).unwrap(), ""));
        assert_ne!(base, cache_key(1, "abc", Window::new(7200, 10800).unwrap(), ""));
        assert_ne!(base, cache_key(1, "abc", Window::new(3600, 7200).unwrap(), "src/"));
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = sample_frame();
        let encoded = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_load_frame_version_mismatch_is_miss() {
        let cache = MemoryCache::new();
        let frame = sample_frame();
        let entry = CacheEntry {
            value: encode_frame(&frame).unwrap(),
            version: CACHE_VALUE_VERSION + 1,
            created_at: 0,
        };
        cache.set("k", &entry).unwrap();
        assert!(load_frame(&cache, "k").is_none());
    }

    #[test]
    fn test_load_frame_corrupt_value_deleted() {
        let cache = MemoryCache::new();
        let entry = CacheEntry {
            value: vec![0xde, 0xad, 0xbe, 0xef],
            version: CACHE_VALUE_VERSION,
            created_at: 0,
        };
        cache.set("k", &entry).unwrap();
        assert!(load_frame(&cache, "k").is_none());
        // One-shot delete: the corrupt entry is gone.
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let cache = MemoryCache::new();
        let frame = sample_frame();
        store_frame(&cache, "k", &frame);
        assert_eq!(load_frame(&cache, "k"), Some(frame));
    }
}
