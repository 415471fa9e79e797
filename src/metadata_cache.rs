//! Read-through cache for resolved media metadata
//!
//! Values are serialized with bincode and stored with a per-entry TTL.
//! Concurrent writers for the same key are last-writer-wins; resolution is
//! idempotent so the stored values agree.

use crate::error::{Result, StreamError};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cached entry with expiration and access tracking
#[derive(Clone)]
struct CacheEntry {
    data: Bytes,
    expires_at: Instant,
    last_accessed: Instant,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Key/value cache with TTL expiry and optional LRU bound
pub struct MetadataCache {
    storage: RwLock<HashMap<String, CacheEntry>>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    /// Create an unbounded cache
    pub fn new() -> Self {
        MetadataCache {
            storage: RwLock::new(HashMap::new()),
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a cache holding at most `max_entries` entries (LRU eviction)
    pub fn with_max_entries(max_entries: usize) -> Self {
        MetadataCache {
            max_entries: Some(max_entries),
            ..Self::new()
        }
    }

    /// Cache key for a (container, object, caller identity) triple
    ///
    /// The identity is part of the key because location handles are only
    /// valid for the session that resolved them.
    pub fn cache_key(container_id: i64, object_id: i32, identity: i64) -> String {
        format!("file:{}:{}:{}", container_id, object_id, identity)
    }

    pub fn get_stats(&self) -> CacheStats {
        let total_entries = self.storage.read().map(|s| s.len()).unwrap_or(0);
        CacheStats {
            total_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Look up and decode a value
    ///
    /// Expired entries and entries that fail to decode count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        let data = match self.storage.read() {
            Ok(storage) => storage
                .get(key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.data.clone()),
            Err(e) => {
                warn!("Cache lookup error: key={}, error={:?}", key, e);
                None
            }
        };

        let Some(data) = data else {
            debug!("Cache miss: key={}", key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match bincode::deserialize::<T>(&data) {
            Ok(value) => {
                debug!("Cache hit: key={}, size={}", key, data.len());
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut storage) = self.storage.write() {
                    if let Some(entry) = storage.get_mut(key) {
                        entry.last_accessed = now;
                    }
                }
                Some(value)
            }
            Err(e) => {
                warn!("Dropping undecodable cache entry: key={}, error={}", key, e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.remove(key);
                None
            }
        }
    }

    /// Encode and store a value with the given TTL
    ///
    /// # Returns
    /// * `Ok(())` if the value was stored
    /// * `Err(StreamError::CacheError)` if encoding fails or the cache is poisoned
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let data = Bytes::from(bincode::serialize(value)?);
        let now = Instant::now();

        let mut storage = self
            .storage
            .write()
            .map_err(|e| StreamError::CacheError(format!("cache lock poisoned: {}", e)))?;

        if let Some(max_entries) = self.max_entries {
            if !storage.contains_key(key) && storage.len() >= max_entries {
                Self::cleanup_expired(&mut *storage, now);
                if storage.len() >= max_entries {
                    let excess = storage.len() + 1 - max_entries;
                    Self::evict_lru(&mut *storage, excess);
                }
            }
        }

        debug!("Storing cache entry: key={}, size={}, ttl={:?}", key, data.len(), ttl);
        storage.insert(
            key.to_string(),
            CacheEntry {
                data,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);

        // Periodically clean up expired entries
        if storage.len() % 100 == 0 {
            Self::cleanup_expired(&mut *storage, now);
        }

        Ok(())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.storage
            .write()
            .map(|mut storage| storage.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        self.storage
            .write()
            .map(|mut storage| {
                let count = storage.len();
                storage.clear();
                count
            })
            .unwrap_or(0)
    }

    fn cleanup_expired(storage: &mut HashMap<String, CacheEntry>, now: Instant) {
        let before = storage.len();
        storage.retain(|_, entry| entry.expires_at > now);
        let removed = before - storage.len();
        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
    }

    /// Evict the `count` least recently used entries
    fn evict_lru(storage: &mut HashMap<String, CacheEntry>, count: usize) {
        let mut entries: Vec<_> = storage
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed))
            .collect();
        entries.sort_by_key(|(_, last_accessed)| *last_accessed);

        for (key, _) in entries.into_iter().take(count) {
            storage.remove(&key);
        }
        debug!("LRU eviction: removed {} entries, {} remain", count, storage.len());
    }
}
