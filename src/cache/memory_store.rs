//! In-process cache with per-key TTL, backed by moka

use crate::cache::{CacheError, CacheKey, CacheStore};
use log::trace;
use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Cached value together with the TTL it was written with
#[derive(Clone, Debug)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL passed to its latest `set`
struct PerEntryTtl;

impl Expiry<CacheKey, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &CacheKey, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-wide cache shared by all request handlers
///
/// Listings and share links live in one cache; each entry carries its own
/// TTL. Capacity is bounded by `max_entries`.
pub struct MemoryCacheStore {
    cache: Cache<CacheKey, Entry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries.max(1) as u64)
            .expire_after(PerEntryTtl)
            .name("file_metadata_cache")
            .build();
        Self { cache }
    }

    /// Number of live entries, after pending expirations and evictions are applied
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let value = self.cache.get(key).map(|entry| entry.value);
        trace!("Cache {} for {}", if value.is_some() { "HIT" } else { "MISS" }, key);
        Ok(value)
    }

    fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert(
            key.clone(),
            Entry {
                value: value.to_string(),
                ttl,
            },
        );
        Ok(())
    }
}
