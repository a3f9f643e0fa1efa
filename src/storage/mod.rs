//! Durable Blob Storage Abstraction
//!
//! This module provides an abstraction over durable blob storage backends,
//! allowing the system to use different storage implementations (local
//! directory, object stores, etc.) without affecting higher-level services.

pub mod local_store;
pub mod mock_store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Blob storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid destination key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// An object held by the blob store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Destination key the object was transferred under
    pub key: String,
    /// Locator handed out when the object was transferred
    pub locator: String,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// Trait defining the durable storage interface
///
/// `transfer` is invoked exactly once per upload; retries, if any, belong to
/// the implementation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `destination_key` and return its locator
    async fn transfer(&self, data: Bytes, destination_key: &str) -> Result<String, StorageError>;

    /// Every object currently held
    async fn list_objects(&self) -> Result<Vec<StoredObject>, StorageError>;

    /// Remove the object stored under `key`
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

/// Reject keys that could escape the storage root
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad_segment = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if key.is_empty() || key.starts_with('/') || key.contains('\\') || bad_segment {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
