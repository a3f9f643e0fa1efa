//! Mock implementation of CacheStore trait for testing

use crate::cache::memory_store::MemoryCacheStore;
use crate::cache::{CacheError, CacheKey, CacheStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Cache backed by [`MemoryCacheStore`] that counts calls and can simulate an outage
pub struct MockCacheStore {
    inner: MemoryCacheStore,
    unavailable: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl MockCacheStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheStore::new(1024),
            unavailable: AtomicBool::new(false),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent get/set fail as if the cache server were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write a value directly, bypassing counters and availability
    pub fn insert_raw(&self, key: &CacheKey, value: &str, ttl: Duration) {
        self.inner
            .set(key, value, ttl)
            .expect("memory cache set cannot fail in tests");
    }

    /// Read a value directly, bypassing counters and availability
    pub fn peek(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key).ok().flatten()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Successful and failed writes alike
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected cache outage".to_string()));
        }
        Ok(())
    }
}

impl Default for MockCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MockCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.get(key)
    }

    fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.set(key, value, ttl)
    }
}
