//! Record Store Abstraction
//!
//! This module provides an abstraction over the relational store that holds
//! file metadata, allowing the system to use different implementations
//! (SQLite, in-memory mock) without affecting higher-level services.

pub mod sqlite_store;
pub mod mock_store;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Principal identifier type
pub type OwnerId = i64;

/// Record store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record store connection lock poisoned")]
    Poisoned,

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// One stored file, as persisted in the record store and exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    /// Identifier assigned by the record store on insert
    #[serde(rename = "file_id")]
    pub id: String,
    pub owner_id: OwnerId,
    pub file_name: String,
    #[serde(rename = "file_size")]
    pub file_size_bytes: u64,
    #[serde(rename = "upload_date", with = "rfc3339")]
    pub upload_timestamp: DateTime<Utc>,
    /// Locator returned by durable storage
    #[serde(rename = "s3_url")]
    pub storage_locator: String,
}

/// Metadata for a file whose transfer has completed but has no id yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub owner_id: OwnerId,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub upload_timestamp: DateTime<Utc>,
    pub storage_locator: String,
    /// Destination key the object was transferred under; never exposed to callers
    pub storage_key: String,
}

impl NewFile {
    /// Attach the id assigned by the record store
    pub fn into_metadata(self, id: String) -> FileMetadata {
        FileMetadata {
            id,
            owner_id: self.owner_id,
            file_name: self.file_name,
            file_size_bytes: self.file_size_bytes,
            upload_timestamp: self.upload_timestamp,
            storage_locator: self.storage_locator,
        }
    }
}

/// Optional narrowing applied by a file search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Substring of the file name
    pub name: Option<String>,
    /// UTC calendar date of the upload
    pub date: Option<NaiveDate>,
}

impl SearchFilter {
    /// Whether a record passes the filter
    pub fn matches(&self, file: &FileMetadata) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .map_or(true, |name| file.file_name.contains(name));
        let date_ok = self
            .date
            .map_or(true, |date| file.upload_timestamp.date_naive() == date);
        name_ok && date_ok
    }
}

/// Canonical text form of an upload timestamp, shared by the store and the wire format
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|ts| ts.with_timezone(&Utc))
}

mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text).map_err(serde::de::Error::custom)
    }
}

/// Trait defining the record store interface
///
/// Every call acquires the underlying connection for one statement only.
pub trait RecordStore: Send + Sync {
    /// Insert metadata for a transferred file and return the assigned id
    fn insert_file(&self, file: &NewFile) -> Result<String, StoreError>;

    /// All files owned by `owner_id`, ordered by upload time then id
    fn files_for_owner(&self, owner_id: OwnerId) -> Result<Vec<FileMetadata>, StoreError>;

    /// The file with `file_id` if and only if it belongs to `owner_id`
    fn find_file(&self, file_id: &str, owner_id: OwnerId) -> Result<Option<FileMetadata>, StoreError>;

    /// Files owned by `owner_id` that pass `filter`, in listing order
    fn search_files(&self, owner_id: OwnerId, filter: &SearchFilter) -> Result<Vec<FileMetadata>, StoreError>;

    /// Whether any row references the object stored under `storage_key`
    fn key_exists(&self, storage_key: &str) -> Result<bool, StoreError>;
}
