//! Shared application state
//!
//! Adapters are built once here and shared by every request as trait
//! objects, so handlers never know which backend they run against.

use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::cache::{memory_store::MemoryCacheStore, mock_store::MockCacheStore, CacheStore};
use crate::config::{AppConfig, ConfigError, MetadataBackend, StorageBackend};
use crate::metadata::{mock_store::MockRecordStore, sqlite_store::SQLiteRecordStore, RecordStore, StoreError};
use crate::service::metadata_service::MetadataService;
use crate::service::reconciliation_worker::ReconciliationWorker;
use crate::service::upload_service::UploadCoordinator;
use crate::storage::{local_store::LocalBlobStore, mock_store::MockBlobStore, BlobStore, StorageError};

/// Failures while wiring the application together
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open record store: {0}")]
    RecordStore(#[from] StoreError),

    #[error("failed to open blob storage: {0}")]
    BlobStore(#[from] StorageError),
}

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub upload_coordinator: Arc<UploadCoordinator>,
    pub metadata_service: Arc<MetadataService>,
    pub blob_store: Arc<dyn BlobStore>,
    pub record_store: Arc<dyn RecordStore>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        info!("Initializing application state with configuration");
        config.validate()?;

        let blob_store: Arc<dyn BlobStore> = match config.storage.backend {
            StorageBackend::Local => {
                info!(
                    "Using local blob storage with base_path: {}, temp_path: {}",
                    config.storage.base_path, config.storage.temp_path
                );
                Arc::new(LocalBlobStore::new(&config.storage)?)
            }
            StorageBackend::Mock => {
                info!("Using mock blob storage");
                Arc::new(MockBlobStore::new())
            }
        };

        let record_store: Arc<dyn RecordStore> = match config.metadata.backend {
            MetadataBackend::SQLite => {
                info!(
                    "Using SQLite record store with db_path: {}, wal_mode: {}",
                    config.metadata.db_path, config.metadata.wal_mode
                );
                Arc::new(SQLiteRecordStore::new(&config.metadata)?)
            }
            MetadataBackend::Mock => {
                info!("Using mock record store");
                Arc::new(MockRecordStore::new())
            }
        };

        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(config.cache.max_entries));

        let state = Self::with_backends(config, blob_store, record_store, cache);
        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Assemble the services over already-built adapters
    pub fn with_backends(
        config: AppConfig,
        blob_store: Arc<dyn BlobStore>,
        record_store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let upload_coordinator = Arc::new(UploadCoordinator::new(
            blob_store.clone(),
            record_store.clone(),
            config.upload.max_file_size,
            config.upload.transfer_timeout(),
        ));
        let metadata_service = Arc::new(MetadataService::new(
            record_store.clone(),
            cache,
            config.cache.listing_ttl(),
            config.cache.share_link_ttl(),
        ));

        Self {
            upload_coordinator,
            metadata_service,
            blob_store,
            record_store,
            config,
        }
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing() -> Self {
        Self::with_backends(
            AppConfig::default(),
            Arc::new(MockBlobStore::new()),
            Arc::new(MockRecordStore::new()),
            Arc::new(MockCacheStore::new()),
        )
    }

    /// A reconciliation worker over this state's adapters
    pub fn reconciliation_worker(&self) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.blob_store.clone(),
            self.record_store.clone(),
            &self.config.reconciliation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::principal::Principal;

    #[test]
    fn test_mock_backends_from_config() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Mock;
        config.metadata.backend = MetadataBackend::Mock;

        let state = AppState::from_config(config).unwrap();
        assert!(state.metadata_service.list_files(Principal::new(1)).unwrap().is_empty());
    }

    #[test]
    fn test_local_backends_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.base_path = dir.path().join("blobs").to_string_lossy().into_owned();
        config.storage.temp_path = dir.path().join("tmp").to_string_lossy().into_owned();
        config.metadata.db_path = dir.path().join("files.db").to_string_lossy().into_owned();

        let state = AppState::from_config(config).unwrap();
        assert!(state.record_store.files_for_owner(1).unwrap().is_empty());
        assert!(dir.path().join("files.db").exists());
    }

    #[tokio::test]
    async fn test_testing_state_runs_an_empty_sweep() {
        let state = AppState::new_for_testing();
        let report = state.reconciliation_worker().sweep().await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(state.upload_coordinator.max_file_size(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.upload.max_file_size = 0;
        assert!(matches!(AppState::from_config(config), Err(StartupError::Config(_))));
    }
}
