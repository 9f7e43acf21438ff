//! # Response Cache
//!
//! Content-addressed, TTL-bounded storage for invocation results. The cache
//! knows nothing about agents or stages: values go in under the fingerprint
//! of their key parts and come back out until they age past the TTL.
//!
//! Caching is best-effort. Read failures are reported as misses and write
//! failures are logged and dropped; neither ever fails the caller.

pub mod fingerprint;
pub mod sqlite;
pub mod store;

use crate::config::{CacheBackend, PipelineConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use fingerprint::{Fingerprint, KeyParts};
pub use sqlite::SqliteStore;
pub use store::{CacheStore, FsStore, MemoryStore};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A stored value. Replaced wholesale on `set`, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    #[serde(skip)]
    pub key: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub value: serde_json::Value,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}

pub struct ResponseCache {
    store: Box<dyn CacheStore>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Box<dyn CacheStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    /// Open the backend selected by the configuration
    pub fn open(config: &PipelineConfig) -> Result<Self, CacheError> {
        let store: Box<dyn CacheStore> = match config.cache_backend {
            CacheBackend::Fs => Box::new(FsStore::open(&config.cache_dir)?),
            CacheBackend::Sqlite => {
                Box::new(SqliteStore::open_at(config.cache_dir.join("cache.db"))?)
            }
        };
        Ok(Self::new(store, config.cache_ttl()))
    }

    /// Look up a live entry. Expired entries are deleted on the way out.
    pub fn get(&self, parts: &KeyParts) -> Option<serde_json::Value> {
        let key = parts.fingerprint();
        let bytes = match self.store.read(key.as_str()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry = match decode_entry(key.as_str(), &bytes) {
            Some(entry) => entry,
            None => {
                tracing::warn!("Ignoring corrupt cache entry {}", key);
                return None;
            }
        };

        if entry.is_expired(self.clock.now(), self.ttl) {
            tracing::debug!("Cache entry {} expired", key);
            if let Err(e) = self.store.remove(key.as_str()) {
                tracing::warn!("Failed to evict expired cache entry {}: {}", key, e);
            }
            return None;
        }

        Some(entry.value)
    }

    /// Store `value` under the fingerprint of `parts`, overwriting any prior entry
    pub fn set(&self, value: serde_json::Value, parts: &KeyParts) {
        let key = parts.fingerprint();
        let entry = CacheEntry {
            key: key.to_string(),
            created_at: self.clock.now(),
            value,
        };
        let bytes = match serde_json::to_vec_pretty(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.write(key.as_str(), &bytes) {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Remove every entry; returns how many were removed
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut count = 0;
        for key in self.store.keys()? {
            if self.store.remove(&key)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Remove expired and unreadable entries; returns how many were removed
    pub fn clear_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut count = 0;
        for key in self.store.keys()? {
            let stale = match self.store.read(&key)? {
                Some(bytes) => match decode_entry(&key, &bytes) {
                    Some(entry) => entry.is_expired(now, self.ttl),
                    None => true,
                },
                None => false,
            };
            if stale && self.store.remove(&key)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of stored entries, live or not
    pub fn len(&self) -> usize {
        self.store.keys().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decode_entry(key: &str, bytes: &[u8]) -> Option<CacheEntry> {
    let mut entry: CacheEntry = serde_json::from_slice(bytes).ok()?;
    entry.key = key.to_string();
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use serde_json::json;

    fn cache_with_clock(ttl_hours: u64) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = ResponseCache::with_clock(
            Box::new(MemoryStore::new()),
            Duration::from_secs(ttl_hours * 3600),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache_with_clock(24);
        let parts = KeyParts::for_call("LeadDocumentLocator", "locate", "");
        assert_eq!(cache.get(&parts), None);

        cache.set(json!({"text": "hello"}), &parts);
        assert_eq!(cache.get(&parts), Some(json!({"text": "hello"})));
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, _) = cache_with_clock(24);
        let parts = KeyParts::for_call("a", "b", "c");
        cache.set(json!(1), &parts);
        cache.set(json!(2), &parts);
        assert_eq!(cache.get(&parts), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let (cache, clock) = cache_with_clock(24);
        let parts = KeyParts::for_call("a", "b", "c");
        cache.set(json!("v"), &parts);

        clock.advance(chrono::Duration::hours(24));
        assert_eq!(cache.get(&parts), Some(json!("v")), "age == TTL is still live");

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(&parts), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let (cache, _) = cache_with_clock(24);
        for i in 0..3 {
            cache.set(json!(i), &KeyParts::new().with("i", i.to_string()));
        }
        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn test_clear_expired_removes_stale_and_corrupt() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::with_clock(
            Box::new(SharedStore(store.clone())),
            Duration::from_secs(3600),
            clock.clone(),
        );

        let old = KeyParts::new().with("k", "old");
        cache.set(json!("old"), &old);
        clock.advance(chrono::Duration::minutes(90));
        let fresh = KeyParts::new().with("k", "fresh");
        cache.set(json!("fresh"), &fresh);
        store.write("garbage", b"not json").unwrap();

        assert_eq!(cache.clear_expired().unwrap(), 2);
        assert_eq!(cache.get(&fresh), Some(json!("fresh")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(Box::new(SharedStore(store.clone())), Duration::from_secs(60));
        let parts = KeyParts::for_call("a", "b", "c");
        store
            .write(parts.fingerprint().as_str(), b"{\"timestamp\": 5}")
            .unwrap();
        assert_eq!(cache.get(&parts), None);
    }

    #[test]
    fn test_read_failure_is_a_miss_and_write_failure_is_swallowed() {
        let cache = ResponseCache::new(Box::new(BrokenStore), Duration::from_secs(60));
        let parts = KeyParts::for_call("a", "b", "c");
        cache.set(json!("v"), &parts);
        assert_eq!(cache.get(&parts), None);
        assert!(cache.clear().is_err());
    }

    #[test]
    fn test_fs_entry_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            ResponseCache::new(Box::new(FsStore::open(dir.path()).unwrap()), Duration::from_secs(60));
        let parts = KeyParts::for_call("a", "b", "c");
        cache.set(json!({"text": "t"}), &parts);

        let path = dir.path().join(format!("{}.json", parts.fingerprint()));
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(doc.get("timestamp").is_some());
        assert_eq!(doc["value"]["text"], "t");
    }

    #[test]
    fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            cache_dir: dir.path().to_path_buf(),
            cache_backend: CacheBackend::Sqlite,
            ..PipelineConfig::default()
        };
        let cache = ResponseCache::open(&config).unwrap();
        cache.set(json!(1), &KeyParts::new().with("a", "b"));
        assert!(dir.path().join("cache.db").exists());
        assert_eq!(cache.len(), 1);
    }

    struct SharedStore(Arc<MemoryStore>);

    impl CacheStore for SharedStore {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.0.read(key)
        }
        fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
            self.0.write(key, bytes)
        }
        fn remove(&self, key: &str) -> Result<bool, CacheError> {
            self.0.remove(key)
        }
        fn keys(&self) -> Result<Vec<String>, CacheError> {
            self.0.keys()
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Backend("disk on fire".into()))
        }
        fn write(&self, _key: &str, _bytes: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Backend("disk on fire".into()))
        }
        fn remove(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("disk on fire".into()))
        }
        fn keys(&self) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Backend("disk on fire".into()))
        }
    }
}
