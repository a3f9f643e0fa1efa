//! Upload coordinator: transfer to durable storage, then persist metadata
//!
//! Each upload runs as its own spawned task. The task transfers the body
//! under a deadline, inserts the metadata row, and reports exactly one
//! terminal result back over a oneshot channel; the request handler waits on
//! that channel only.

use crate::error::ServiceError;
use crate::metadata::{FileMetadata, NewFile, RecordStore};
use crate::service::principal::Principal;
use crate::storage::BlobStore;
use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const MIB: u64 = 1024 * 1024;

/// One inbound file, fully received
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner: Principal,
    pub file_name: String,
    /// Byte length announced by the client
    pub declared_size: u64,
    pub body: Bytes,
}

/// Coordinates the transfer and metadata write of uploads
pub struct UploadCoordinator {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    max_file_size: u64,
    transfer_timeout: Duration,
}

impl UploadCoordinator {
    /// Create a new coordinator with injected storage and record store
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        max_file_size: u64,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            blobs,
            records,
            max_file_size,
            transfer_timeout,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// The rejection returned for anything above `max_file_size`
    pub fn too_large(&self) -> ServiceError {
        ServiceError::Validation(format!("File exceeds maximum size of {} MB", self.max_file_size / MIB))
    }

    /// Reject a declared size before any byte is read or transferred
    pub fn check_declared_size(&self, declared_size: u64) -> Result<(), ServiceError> {
        if declared_size == 0 {
            return Err(ServiceError::Validation("File is required".to_string()));
        }
        if declared_size > self.max_file_size {
            return Err(self.too_large());
        }
        Ok(())
    }

    fn validate(&self, request: &UploadRequest) -> Result<(), ServiceError> {
        self.check_declared_size(request.declared_size)?;
        if request.file_name.trim().is_empty() {
            return Err(ServiceError::Validation("File name is required".to_string()));
        }
        if request.body.len() as u64 != request.declared_size {
            return Err(ServiceError::Validation(format!(
                "Received {} bytes but {} were declared",
                request.body.len(),
                request.declared_size
            )));
        }
        Ok(())
    }

    /// Run one upload to completion and return the stored metadata.
    ///
    /// Rejected requests never reach durable storage. Otherwise the first
    /// failure of the transfer or the metadata write is returned; a
    /// successful transfer followed by a failed write leaves an orphaned
    /// object for the reconciliation worker.
    pub async fn upload(&self, request: UploadRequest) -> Result<FileMetadata, ServiceError> {
        if let Err(e) = self.validate(&request) {
            info!("Rejected upload of {:?} for owner {}: {}", request.file_name, request.owner, e);
            return Err(e);
        }

        let destination_key = destination_key(request.owner, &request.file_name, &request.body);
        let task = UploadTask {
            blobs: self.blobs.clone(),
            records: self.records.clone(),
            transfer_timeout: self.transfer_timeout,
            destination_key,
            request,
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = task.run().await;
            if tx.send(outcome).is_err() {
                warn!("Upload finished after its caller went away");
            }
        });

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Internal("upload task ended without reporting".to_string())),
        }
    }
}

/// Everything the spawned unit of work needs, owned
struct UploadTask {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    transfer_timeout: Duration,
    destination_key: String,
    request: UploadRequest,
}

impl UploadTask {
    async fn run(self) -> Result<FileMetadata, ServiceError> {
        let UploadTask {
            blobs,
            records,
            transfer_timeout,
            destination_key,
            request,
        } = self;
        let size = request.body.len() as u64;

        debug!("Transferring {} bytes to {}", size, destination_key);
        let locator = match tokio::time::timeout(transfer_timeout, blobs.transfer(request.body, &destination_key)).await {
            Ok(Ok(locator)) => locator,
            Ok(Err(e)) => {
                error!("Transfer of {} failed: {}", destination_key, e);
                return Err(ServiceError::Transfer(e));
            }
            Err(_) => {
                error!("Transfer of {} timed out after {:?}", destination_key, transfer_timeout);
                return Err(ServiceError::TransferTimeout(transfer_timeout));
            }
        };

        let file = NewFile {
            owner_id: request.owner.id(),
            file_name: request.file_name,
            file_size_bytes: size,
            upload_timestamp: Utc::now().trunc_subsecs(0),
            storage_locator: locator,
            storage_key: destination_key,
        };

        match records.insert_file(&file) {
            Ok(id) => {
                info!("Stored file {} ({} bytes) for owner {} at {}", id, size, file.owner_id, file.storage_locator);
                Ok(file.into_metadata(id))
            }
            Err(e) => {
                error!(
                    "Metadata write failed for owner {}; object {} ({}) is orphaned: {}",
                    file.owner_id, file.storage_key, file.storage_locator, e
                );
                Err(ServiceError::Persist(e))
            }
        }
    }
}

/// Unique destination key: `{owner}/{unix_millis}-{content digest}-{file name}`
fn destination_key(owner: Principal, file_name: &str, body: &[u8]) -> String {
    let digest = md5::compute(body);
    let digest_hex = hex::encode(digest.0);
    format!(
        "{}/{}-{}-{}",
        owner,
        Utc::now().timestamp_millis(),
        &digest_hex[..12],
        sanitize_file_name(file_name)
    )
}

/// Keep a client file name usable as a single key segment
fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock_store::MockRecordStore;
    use crate::storage::mock_store::{MockBlobStore, TransferBehavior};

    const MAX: u64 = 10 * MIB;

    struct Fixture {
        blobs: Arc<MockBlobStore>,
        records: Arc<MockRecordStore>,
        coordinator: UploadCoordinator,
    }

    fn fixture() -> Fixture {
        let blobs = Arc::new(MockBlobStore::new());
        let records = Arc::new(MockRecordStore::starting_at(901));
        let coordinator = UploadCoordinator::new(blobs.clone(), records.clone(), MAX, Duration::from_secs(60));
        Fixture {
            blobs,
            records,
            coordinator,
        }
    }

    fn request(owner: i64, name: &str, size: usize) -> UploadRequest {
        UploadRequest {
            owner: Principal::new(owner),
            file_name: name.to_string(),
            declared_size: size as u64,
            body: Bytes::from(vec![7u8; size]),
        }
    }

    #[tokio::test]
    async fn test_upload_completes_with_locator() {
        let f = fixture();
        f.blobs
            .set_behavior(TransferBehavior::FixedLocator("https://blob/abc123".into()));

        let stored = f.coordinator.upload(request(42, "report.pdf", 2048)).await.unwrap();
        assert_eq!(stored.id, "901");
        assert_eq!(stored.owner_id, 42);
        assert_eq!(stored.file_size_bytes, 2048);
        assert_eq!(stored.storage_locator, "https://blob/abc123");
        assert_eq!(f.blobs.transfer_calls(), 1);
        assert_eq!(f.records.file_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_upload_never_reaches_storage() {
        let f = fixture();
        let oversized = UploadRequest {
            declared_size: MAX + 1,
            ..request(42, "big.bin", 16)
        };

        let err = f.coordinator.upload(oversized).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(err.to_string(), "File exceeds maximum size of 10 MB");
        assert_eq!(f.blobs.transfer_calls(), 0);
        assert_eq!(f.records.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_size_at_ceiling_is_accepted() {
        let f = fixture();
        assert!(f.coordinator.check_declared_size(MAX).is_ok());
        assert!(f.coordinator.check_declared_size(MAX + 1).is_err());
        assert!(f.coordinator.check_declared_size(0).is_err());
    }

    #[tokio::test]
    async fn test_body_length_mismatch_is_rejected() {
        let f = fixture();
        let short = UploadRequest {
            declared_size: 100,
            ..request(42, "a.txt", 10)
        };
        assert!(matches!(f.coordinator.upload(short).await, Err(ServiceError::Validation(_))));

        let unnamed = request(42, "  ", 10);
        assert!(matches!(f.coordinator.upload(unnamed).await, Err(ServiceError::Validation(_))));
        assert_eq!(f.blobs.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_writes_no_metadata() {
        let f = fixture();
        f.blobs.set_behavior(TransferBehavior::Fail("bucket gone".into()));

        let err = f.coordinator.upload(request(42, "report.pdf", 2048)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transfer(_)));
        assert_eq!(f.records.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_wins_over_transfer_success() {
        let f = fixture();
        f.records.fail_inserts(true);

        let err = f.coordinator.upload(request(42, "report.pdf", 2048)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persist(_)));
        // The object exists even though the upload failed
        assert_eq!(f.blobs.object_count(), 1);
        assert_eq!(f.records.file_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transfer_times_out() {
        let f = fixture();
        f.blobs.set_behavior(TransferBehavior::Hang);

        let err = f.coordinator.upload(request(42, "report.pdf", 2048)).await.unwrap_err();
        assert!(matches!(err, ServiceError::TransferTimeout(d) if d == Duration::from_secs(60)));
        assert_eq!(f.records.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_vanished_upload_task_reports_internal_error() {
        let f = fixture();
        f.blobs.set_behavior(TransferBehavior::Panic);

        let err = f.coordinator.upload(request(42, "report.pdf", 2048)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(f.blobs.transfer_calls(), 1);
        assert_eq!(f.records.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_independent() {
        let f = Arc::new(fixture());

        let uploads: Vec<_> = (0..8)
            .map(|i| {
                let f = f.clone();
                tokio::spawn(async move { f.coordinator.upload(request(42, &format!("file-{}.txt", i), 64)).await })
            })
            .collect();

        for upload in uploads {
            assert!(upload.await.unwrap().is_ok());
        }
        assert_eq!(f.blobs.transfer_calls(), 8);
        assert_eq!(f.blobs.object_count(), 8);
        assert_eq!(f.records.file_count(), 8);
    }

    #[test]
    fn test_destination_key_shape() {
        let key = destination_key(Principal::new(42), "../etc/passwd", b"hello");
        let (owner, rest) = key.split_once('/').unwrap();
        assert_eq!(owner, "42");
        assert!(!rest.contains('/'));
        assert!(rest.ends_with("-.._etc_passwd"));
        assert!(crate::storage::validate_key(&key).is_ok());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_name(".."), "_");
    }
}
