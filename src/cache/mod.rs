//! Metadata Cache Abstraction
//!
//! Key-value cache with per-key TTL. The cache only ever holds derived
//! copies of record-store data; it owns no business logic.

pub mod memory_store;
pub mod mock_store;

use crate::metadata::OwnerId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cache operation errors; never surfaced to callers
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// What a cached entry is a snapshot of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePurpose {
    /// JSON listing of one owner's files
    FilesMetadata,
    /// Storage locator of one owned file
    FileShareLink,
}

impl CachePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePurpose::FilesMetadata => "files_metadata",
            CachePurpose::FileShareLink => "file_share_link",
        }
    }
}

/// Cache key made of a purpose and the subject it describes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub purpose: CachePurpose,
    pub subject: String,
}

impl CacheKey {
    /// Key for the file listing of `owner_id`
    pub fn files_metadata(owner_id: OwnerId) -> Self {
        Self {
            purpose: CachePurpose::FilesMetadata,
            subject: owner_id.to_string(),
        }
    }

    /// Key for the share link of `file_id`, scoped to the owner that resolved it
    pub fn share_link(owner_id: OwnerId, file_id: &str) -> Self {
        Self {
            purpose: CachePurpose::FileShareLink,
            subject: format!("{}:{}", owner_id, file_id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.purpose.as_str(), self.subject)
    }
}

/// Trait defining the cache interface
pub trait CacheStore: Send + Sync {
    /// Value under `key`, or `None` when absent or expired
    fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl`
    fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), CacheError>;
}
