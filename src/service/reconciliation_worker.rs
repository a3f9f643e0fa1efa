//! Background reconciliation worker for orphaned objects
//!
//! An upload whose metadata write fails (or whose process dies between the
//! transfer and the write) leaves an object in durable storage with no
//! metadata row. This worker runs periodically, finds such objects once they
//! are older than a grace period, and deletes them.

use crate::config::ReconciliationConfig;
use crate::metadata::RecordStore;
use crate::storage::{BlobStore, StorageError};
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Counts from one sweep
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    /// Objects listed from durable storage
    pub scanned: usize,
    /// Objects past the grace period with no metadata row
    pub orphaned: usize,
    /// Orphans successfully deleted
    pub removed: usize,
}

/// Background reconciliation worker
pub struct ReconciliationWorker {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    interval: Duration,
    grace_period: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            blobs,
            records,
            interval: Duration::from_secs(config.interval_secs),
            grace_period: Duration::from_secs(config.grace_period_secs),
        }
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting reconciliation worker with {}s interval and {}s grace period",
            self.interval.as_secs(),
            self.grace_period.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);

            loop {
                interval.tick().await;

                match self.sweep().await {
                    Ok(report) if report.orphaned > 0 => info!(
                        "Reconciliation removed {}/{} orphaned objects ({} scanned)",
                        report.removed, report.orphaned, report.scanned
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Error listing objects for reconciliation: {}", e),
                }
            }
        })
    }

    /// Run one pass over durable storage
    pub async fn sweep(&self) -> Result<SweepReport, StorageError> {
        let objects = self.blobs.list_objects().await?;
        let mut report = SweepReport {
            scanned: objects.len(),
            ..SweepReport::default()
        };

        // A grace period reaching before the epoch means nothing is old enough yet
        let Some(cutoff) = chrono::Duration::from_std(self.grace_period)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
        else {
            return Ok(report);
        };

        for object in objects {
            // Young objects may still be waiting for their metadata write
            if object.modified > cutoff {
                continue;
            }

            // Rows are matched by key; locators depend on the configured public URL
            match self.records.key_exists(&object.key) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    // Without an answer the object must be assumed referenced
                    warn!("Skipping {}: record store lookup failed: {}", object.key, e);
                    continue;
                }
            }

            report.orphaned += 1;
            match self.blobs.delete_object(&object.key).await {
                Ok(()) => {
                    info!("Deleted orphaned object {} ({})", object.key, object.locator);
                    report.removed += 1;
                }
                Err(e) => error!("Failed to delete orphaned object {}: {}", object.key, e),
            }
        }

        Ok(report)
    }
}
