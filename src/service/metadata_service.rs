//! Metadata service: cache-aside reads over the record store

use crate::cache::{CacheKey, CacheStore};
use crate::error::ServiceError;
use crate::metadata::{FileMetadata, RecordStore, SearchFilter};
use crate::service::principal::Principal;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a cache lookup, with outages kept apart from misses
enum Lookup {
    Hit(String),
    Miss,
    Unavailable,
}

/// Serves file listings and share links, cache first, record store second
pub struct MetadataService {
    records: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    listing_ttl: Duration,
    share_link_ttl: Duration,
}

impl MetadataService {
    /// Create a new metadata service with injected record store and cache
    pub fn new(
        records: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        listing_ttl: Duration,
        share_link_ttl: Duration,
    ) -> Self {
        Self {
            records,
            cache,
            listing_ttl,
            share_link_ttl,
        }
    }

    fn lookup(&self, key: &CacheKey) -> Lookup {
        match self.cache.get(key) {
            Ok(Some(value)) => Lookup::Hit(value),
            Ok(None) => Lookup::Miss,
            Err(e) => {
                warn!("Cache read for {} failed, falling back to record store: {}", key, e);
                Lookup::Unavailable
            }
        }
    }

    fn populate(&self, key: &CacheKey, value: &str, ttl: Duration) {
        match self.cache.set(key, value, ttl) {
            Ok(()) => debug!("Cached {} for {}s", key, ttl.as_secs()),
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }
    }

    /// All files owned by `owner`, in upload order.
    ///
    /// A cached listing that does not deserialize is an error, not a miss.
    /// After a cache outage the record-store result is returned uncached.
    pub fn list_files(&self, owner: Principal) -> Result<Vec<FileMetadata>, ServiceError> {
        let key = CacheKey::files_metadata(owner.id());

        let lookup = self.lookup(&key);
        if let Lookup::Hit(json) = lookup {
            debug!("Cache hit for {}", key);
            return serde_json::from_str(&json).map_err(|source| ServiceError::CorruptCache {
                key: key.to_string(),
                source,
            });
        }

        let files = self
            .records
            .files_for_owner(owner.id())
            .map_err(ServiceError::store("fetch file metadata"))?;

        if let Lookup::Miss = lookup {
            match serde_json::to_string(&files) {
                Ok(json) => self.populate(&key, &json, self.listing_ttl),
                Err(e) => warn!("Failed to serialize listing for {}: {}", key, e),
            }
        }

        info!("Fetched {} files for owner {} from record store", files.len(), owner);
        Ok(files)
    }

    /// Storage locator of `file_id`, which must belong to `owner`.
    ///
    /// Cached per (owner, file) so a cached link is only ever served to the
    /// owner it was resolved for. Unknown or foreign files are never cached.
    pub fn resolve_share_link(&self, file_id: &str, owner: Principal) -> Result<String, ServiceError> {
        let key = CacheKey::share_link(owner.id(), file_id);

        let lookup = self.lookup(&key);
        if let Lookup::Hit(locator) = lookup {
            debug!("Cache hit for {}", key);
            return Ok(locator);
        }

        let file = self
            .records
            .find_file(file_id, owner.id())
            .map_err(ServiceError::store("fetch file URL"))?
            .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))?;

        if let Lookup::Miss = lookup {
            self.populate(&key, &file.storage_locator, self.share_link_ttl);
        }
        Ok(file.storage_locator)
    }

    /// Files owned by `owner` that pass `filter`; always read from the record store
    pub fn search_files(&self, owner: Principal, filter: &SearchFilter) -> Result<Vec<FileMetadata>, ServiceError> {
        self.records
            .search_files(owner.id(), filter)
            .map_err(ServiceError::store("search files"))
    }
}
