//! SQLite implementation of RecordStore trait

use crate::config::MetadataConfig;
use crate::metadata::{
    format_timestamp, parse_timestamp, FileMetadata, NewFile, OwnerId, RecordStore, SearchFilter, StoreError,
};
use log::{debug, info};
use rusqlite::{params, Connection, Row, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL CHECK (file_size > 0),
        upload_date TEXT NOT NULL,
        s3_url TEXT NOT NULL,
        storage_key TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_user_id ON files (user_id);
    CREATE INDEX IF NOT EXISTS idx_files_storage_key ON files (storage_key);
";

const SELECT_COLUMNS: &str = "SELECT id, user_id, file_name, file_size, upload_date, s3_url FROM files";

/// SQLite implementation of RecordStore
pub struct SQLiteRecordStore {
    conn: Mutex<Connection>,
}

impl SQLiteRecordStore {
    /// Open (creating if needed) the database described by `config`
    pub fn new(config: &MetadataConfig) -> Result<Self, StoreError> {
        let path = Path::new(&config.db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if config.wal_mode {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        info!("Opened SQLite record store at {}", config.db_path);
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and the mock-free dev setup
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_files(&self, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<FileMetadata>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, raw_row)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?.into_metadata()?);
        }
        Ok(files)
    }
}

/// Column values as read, before the timestamp and size are checked
struct RawRow {
    id: i64,
    user_id: i64,
    file_name: String,
    file_size: i64,
    upload_date: String,
    s3_url: String,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        upload_date: row.get(4)?,
        s3_url: row.get(5)?,
    })
}

impl RawRow {
    fn into_metadata(self) -> Result<FileMetadata, StoreError> {
        let upload_timestamp = parse_timestamp(&self.upload_date)
            .map_err(|e| StoreError::CorruptRow(format!("file {}: bad upload_date {:?}: {}", self.id, self.upload_date, e)))?;
        let file_size_bytes = u64::try_from(self.file_size)
            .map_err(|_| StoreError::CorruptRow(format!("file {}: negative file_size {}", self.id, self.file_size)))?;

        Ok(FileMetadata {
            id: self.id.to_string(),
            owner_id: self.user_id,
            file_name: self.file_name,
            file_size_bytes,
            upload_timestamp,
            storage_locator: self.s3_url,
        })
    }
}

impl RecordStore for SQLiteRecordStore {
    fn insert_file(&self, file: &NewFile) -> Result<String, StoreError> {
        let file_size = i64::try_from(file.file_size_bytes)
            .map_err(|_| StoreError::CorruptRow(format!("file_size {} out of range", file.file_size_bytes)))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (user_id, file_name, file_size, upload_date, s3_url, storage_key) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.owner_id,
                file.file_name,
                file_size,
                format_timestamp(&file.upload_timestamp),
                file.storage_locator,
                file.storage_key
            ],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    fn files_for_owner(&self, owner_id: OwnerId) -> Result<Vec<FileMetadata>, StoreError> {
        let sql = format!("{} WHERE user_id = ?1 ORDER BY upload_date, id", SELECT_COLUMNS);
        self.query_files(&sql, &[&owner_id])
    }

    fn find_file(&self, file_id: &str, owner_id: OwnerId) -> Result<Option<FileMetadata>, StoreError> {
        // Ids are rowids; anything else cannot name a row.
        let Ok(id) = file_id.parse::<i64>() else {
            return Ok(None);
        };
        let sql = format!("{} WHERE id = ?1 AND user_id = ?2", SELECT_COLUMNS);
        Ok(self.query_files(&sql, &[&id, &owner_id])?.pop())
    }

    fn search_files(&self, owner_id: OwnerId, filter: &SearchFilter) -> Result<Vec<FileMetadata>, StoreError> {
        let mut sql = format!("{} WHERE user_id = ?", SELECT_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(owner_id)];

        if let Some(name) = &filter.name {
            // instr is case-sensitive and has no wildcards, unlike LIKE
            sql.push_str(" AND instr(file_name, ?) > 0");
            args.push(Box::new(name.clone()));
        }
        if let Some(date) = filter.date {
            sql.push_str(" AND substr(upload_date, 1, 10) = ?");
            args.push(Box::new(date.format("%Y-%m-%d").to_string()));
        }
        sql.push_str(" ORDER BY upload_date, id");

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        self.query_files(&sql, &arg_refs)
    }

    fn key_exists(&self, storage_key: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE storage_key = ?1",
            params![storage_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn new_file(owner_id: OwnerId, name: &str, day: u32) -> NewFile {
        NewFile {
            owner_id,
            file_name: name.to_string(),
            file_size_bytes: 2048,
            upload_timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            storage_locator: format!("https://blob/{}/{}", owner_id, name),
            storage_key: format!("{}/{}", owner_id, name),
        }
    }

    #[test]
    fn test_sqlite_record_store_basic_operations() {
        let store = SQLiteRecordStore::open_in_memory().unwrap();

        let id = store.insert_file(&new_file(42, "report.pdf", 9)).unwrap();
        store.insert_file(&new_file(7, "other.txt", 9)).unwrap();

        let files = store.files_for_owner(42).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, id);
        assert_eq!(files[0].file_name, "report.pdf");
        assert_eq!(files[0].file_size_bytes, 2048);
        assert_eq!(files[0].upload_timestamp, Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap());

        let found = store.find_file(&id, 42).unwrap().unwrap();
        assert_eq!(found.storage_locator, "https://blob/42/report.pdf");

        // Ownership is part of the lookup
        assert!(store.find_file(&id, 7).unwrap().is_none());
        assert!(store.find_file("not-a-number", 42).unwrap().is_none());

        assert!(store.key_exists("42/report.pdf").unwrap());
        assert!(!store.key_exists("42/missing").unwrap());
    }

    #[test]
    fn test_files_for_unknown_owner_is_empty() {
        let store = SQLiteRecordStore::open_in_memory().unwrap();
        assert!(store.files_for_owner(404).unwrap().is_empty());
    }

    #[test]
    fn test_listing_is_ordered_by_upload_time() {
        let store = SQLiteRecordStore::open_in_memory().unwrap();
        store.insert_file(&new_file(1, "late.txt", 20)).unwrap();
        store.insert_file(&new_file(1, "early.txt", 2)).unwrap();

        let names: Vec<_> = store.files_for_owner(1).unwrap().into_iter().map(|f| f.file_name).collect();
        assert_eq!(names, vec!["early.txt", "late.txt"]);
    }

    #[test]
    fn test_search_by_name_and_date() {
        let store = SQLiteRecordStore::open_in_memory().unwrap();
        store.insert_file(&new_file(1, "report_q1.pdf", 9)).unwrap();
        store.insert_file(&new_file(1, "report_q2.pdf", 10)).unwrap();
        store.insert_file(&new_file(1, "photo.png", 9)).unwrap();
        store.insert_file(&new_file(2, "report_q1.pdf", 9)).unwrap();

        let by_name = store
            .search_files(1, &SearchFilter { name: Some("report".into()), date: None })
            .unwrap();
        assert_eq!(by_name.len(), 2);

        let by_date = store
            .search_files(1, &SearchFilter { name: None, date: NaiveDate::from_ymd_opt(2024, 3, 9) })
            .unwrap();
        assert_eq!(by_date.len(), 2);

        let both = store
            .search_files(1, &SearchFilter { name: Some("report".into()), date: NaiveDate::from_ymd_opt(2024, 3, 9) })
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].file_name, "report_q1.pdf");

        // Wildcard characters are matched literally
        let wildcard = store
            .search_files(1, &SearchFilter { name: Some("%".into()), date: None })
            .unwrap();
        assert!(wildcard.is_empty());
    }

    #[test]
    fn test_zero_size_rows_are_rejected_by_schema() {
        let store = SQLiteRecordStore::open_in_memory().unwrap();
        let mut file = new_file(1, "empty.txt", 1);
        file.file_size_bytes = 0;
        assert!(matches!(store.insert_file(&file), Err(StoreError::Database(_))));
    }

    #[test]
    fn test_file_backed_store_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = MetadataConfig {
            db_path: dir.path().join("nested").join("metadata.db").to_string_lossy().into_owned(),
            ..MetadataConfig::default()
        };

        let id = {
            let store = SQLiteRecordStore::new(&config).unwrap();
            store.insert_file(&new_file(5, "kept.bin", 1)).unwrap()
        };

        let reopened = SQLiteRecordStore::new(&config).unwrap();
        assert!(reopened.find_file(&id, 5).unwrap().is_some());
    }
}
