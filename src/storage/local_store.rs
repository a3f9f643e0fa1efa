//! Local directory blob storage implementation

use crate::config::StorageConfig;
use crate::storage::{validate_key, BlobStore, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Blob store that keeps each object as one file under `base_path`
///
/// Objects are written to `temp_path` first and renamed into place, so a
/// listed object is always complete.
pub struct LocalBlobStore {
    base_path: PathBuf,
    temp_path: PathBuf,
    public_base_url: String,
    staged: AtomicU64,
}

impl LocalBlobStore {
    /// Create the store, creating its directories if needed
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let base_path = PathBuf::from(&config.base_path);
        let temp_path = PathBuf::from(&config.temp_path);
        std::fs::create_dir_all(&base_path)?;
        std::fs::create_dir_all(&temp_path)?;
        info!(
            "Using local blob storage at {} (staging in {})",
            base_path.display(),
            temp_path.display()
        );

        // Without a public URL, locators point straight at the stored file
        let public_base_url = match config.public_base_url.trim_end_matches('/') {
            "" => format!("file://{}", std::fs::canonicalize(&base_path)?.display()),
            url => url.to_string(),
        };

        Ok(Self {
            base_path,
            temp_path,
            public_base_url,
            staged: AtomicU64::new(0),
        })
    }

    fn locator_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn transfer(&self, data: Bytes, destination_key: &str) -> Result<String, StorageError> {
        validate_key(destination_key)?;
        let destination = self.base_path.join(destination_key);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staged = self
            .temp_path
            .join(format!("upload-{}-{}", std::process::id(), self.staged.fetch_add(1, Ordering::Relaxed)));
        if let Err(e) = fs::write(&staged, &data).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }
        fs::rename(&staged, &destination).await?;

        debug!("Stored {} bytes at {}", data.len(), destination.display());
        Ok(self.locator_for(destination_key))
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    warn!("Skipping non UTF-8 object path {}", path.display());
                    continue;
                };
                let modified: DateTime<Utc> = metadata.modified()?.into();
                objects.push(StoredObject {
                    locator: self.locator_for(&key),
                    key,
                    modified,
                });
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match fs::remove_file(self.base_path.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
