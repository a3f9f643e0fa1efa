//! Mock implementation of RecordStore trait for testing

use crate::metadata::{FileMetadata, NewFile, OwnerId, RecordStore, SearchFilter, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock implementation of RecordStore with call counters and failure injection
pub struct MockRecordStore {
    files: Mutex<Vec<FileMetadata>>,
    keys: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
    insert_calls: AtomicUsize,
    list_calls: AtomicUsize,
    find_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MockRecordStore {
    /// Create a new mock record store that assigns ids from 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a mock whose first inserted row gets `first_id`
    pub fn starting_at(first_id: u64) -> Self {
        Self {
            files: Mutex::new(Vec::new()),
            keys: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(first_id),
            fail_inserts: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            insert_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            find_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent insert fail
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of stored rows
    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn check_queries(&self) -> Result<(), StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected query failure".to_string()));
        }
        Ok(())
    }

    fn owned_by(&self, owner_id: OwnerId, filter: &SearchFilter) -> Vec<FileMetadata> {
        let files = self.files.lock().unwrap();
        let mut owned: Vec<FileMetadata> = files
            .iter()
            .filter(|f| f.owner_id == owner_id && filter.matches(f))
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.upload_timestamp
                .cmp(&b.upload_timestamp)
                .then_with(|| id_key(&a.id).cmp(&id_key(&b.id)))
        });
        owned
    }
}

fn id_key(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

impl Default for MockRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MockRecordStore {
    fn insert_file(&self, file: &NewFile) -> Result<String, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected insert failure".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.keys.lock().unwrap().insert(file.storage_key.clone());
        self.files.lock().unwrap().push(file.clone().into_metadata(id.clone()));
        Ok(id)
    }

    fn files_for_owner(&self, owner_id: OwnerId) -> Result<Vec<FileMetadata>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_queries()?;
        Ok(self.owned_by(owner_id, &SearchFilter::default()))
    }

    fn find_file(&self, file_id: &str, owner_id: OwnerId) -> Result<Option<FileMetadata>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_queries()?;
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .find(|f| f.id == file_id && f.owner_id == owner_id)
            .cloned())
    }

    fn search_files(&self, owner_id: OwnerId, filter: &SearchFilter) -> Result<Vec<FileMetadata>, StoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.check_queries()?;
        Ok(self.owned_by(owner_id, filter))
    }

    fn key_exists(&self, storage_key: &str) -> Result<bool, StoreError> {
        self.check_queries()?;
        Ok(self.keys.lock().unwrap().contains(storage_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_file(owner_id: OwnerId, name: &str) -> NewFile {
        NewFile {
            owner_id,
            file_name: name.to_string(),
            file_size_bytes: 10,
            upload_timestamp: Utc::now(),
            storage_locator: format!("mock://{}", name),
            storage_key: format!("{}/{}", owner_id, name),
        }
    }

    #[test]
    fn test_mock_record_store_basic_operations() {
        let store = MockRecordStore::starting_at(901);

        let id = store.insert_file(&new_file(42, "report.pdf")).unwrap();
        assert_eq!(id, "901");
        assert_eq!(store.insert_file(&new_file(42, "notes.txt")).unwrap(), "902");
        assert_eq!(store.file_count(), 2);

        assert_eq!(store.files_for_owner(42).unwrap().len(), 2);
        assert!(store.files_for_owner(7).unwrap().is_empty());
        assert_eq!(store.list_calls(), 2);

        assert!(store.find_file("901", 42).unwrap().is_some());
        assert!(store.find_file("901", 7).unwrap().is_none());
        assert_eq!(store.find_calls(), 2);

        assert!(store.key_exists("42/report.pdf").unwrap());
        assert!(!store.key_exists("7/report.pdf").unwrap());
    }

    #[test]
    fn test_mock_record_store_injected_failures() {
        let store = MockRecordStore::new();

        store.fail_inserts(true);
        assert!(store.insert_file(&new_file(1, "a")).is_err());
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.file_count(), 0);

        store.fail_queries(true);
        assert!(store.files_for_owner(1).is_err());
        assert!(store.find_file("1", 1).is_err());
        assert!(store.search_files(1, &SearchFilter::default()).is_err());
    }
}
