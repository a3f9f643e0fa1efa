//! Mock implementation of BlobStore trait for testing

use crate::storage::{BlobStore, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the mock answers `transfer`
#[derive(Debug, Clone, PartialEq)]
pub enum TransferBehavior {
    /// Store the object and return `{prefix}{key}`
    Succeed,
    /// Store the object and return this exact locator
    FixedLocator(String),
    /// Fail without storing anything
    Fail(String),
    /// Never complete
    Hang,
    /// Panic inside the transfer
    Panic,
}

/// In-memory blob store with a transfer counter
pub struct MockBlobStore {
    objects: Mutex<HashMap<String, (String, Bytes, DateTime<Utc>)>>,
    behavior: Mutex<TransferBehavior>,
    locator_prefix: String,
    transfer_calls: AtomicUsize,
}

impl MockBlobStore {
    /// Create a mock whose locators look like `https://blob/{key}`
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            behavior: Mutex::new(TransferBehavior::Succeed),
            locator_prefix: "https://blob/".to_string(),
            transfer_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: TransferBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Bytes stored under `key`
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(_, data, _)| data.clone())
    }

    /// Place an object directly, as if transferred at `modified`
    pub fn insert_object(&self, key: &str, locator: &str, modified: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (locator.to_string(), Bytes::new(), modified));
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn transfer(&self, data: Bytes, destination_key: &str) -> Result<String, StorageError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();

        let locator = match behavior {
            TransferBehavior::Succeed => format!("{}{}", self.locator_prefix, destination_key),
            TransferBehavior::FixedLocator(locator) => locator,
            TransferBehavior::Fail(reason) => return Err(StorageError::Backend(reason)),
            TransferBehavior::Hang => std::future::pending().await,
            TransferBehavior::Panic => panic!("injected transfer panic for {}", destination_key),
        };

        self.objects
            .lock()
            .unwrap()
            .insert(destination_key.to_string(), (locator.clone(), data, Utc::now()));
        Ok(locator)
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>, StorageError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .map(|(key, (locator, _, modified))| StoredObject {
                key: key.clone(),
                locator: locator.clone(),
                modified: *modified,
            })
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }
}
