use std::sync::Mutex;

use camino::Utf8Path;
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::DatasetId;
use crate::error::SyncError;

/// Persisted proof that a dataset has been downloaded and normalized, with
/// the remote timestamp recorded at that time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub file_id: String,
    pub filename: String,
    pub last_modified: String,
    pub last_processed: String,
}

/// Durable per-dataset sync state in a single SQLite table. The connection
/// is mutex-guarded so worker threads serialize on the database; `INSERT OR
/// REPLACE` keeps each upsert a single atomic statement.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Opens (creating if needed) the database and its table. Reopening an
    /// existing database leaves its rows untouched.
    pub fn open(path: &Utf8Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())
            .map_err(|err| SyncError::Metadata(err.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS file_metadata (
                file_id TEXT PRIMARY KEY,
                filename TEXT,
                last_modified TEXT,
                last_processed TEXT
            )",
            [],
        )
        .map_err(|err| SyncError::Metadata(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or wholly replaces the record for `record.file_id`.
    pub fn upsert(&self, record: &SyncRecord) -> Result<(), SyncError> {
        let conn = self.conn.lock().expect("metadata store mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO file_metadata (file_id, filename, last_modified, last_processed)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.file_id,
                record.filename,
                record.last_modified,
                record.last_processed
            ],
        )
        .map_err(|err| SyncError::Metadata(err.to_string()))?;
        Ok(())
    }

    pub fn get(&self, id: &DatasetId) -> Result<Option<SyncRecord>, SyncError> {
        let conn = self.conn.lock().expect("metadata store mutex poisoned");
        conn.query_row(
            "SELECT file_id, filename, last_modified, last_processed
             FROM file_metadata WHERE file_id = ?1",
            params![id.as_str()],
            |row| {
                Ok(SyncRecord {
                    file_id: row.get(0)?,
                    filename: row.get(1)?,
                    last_modified: row.get(2)?,
                    last_processed: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|err| SyncError::Metadata(err.to_string()))
    }

    /// Number of recorded datasets. Diagnostic only.
    pub fn count(&self) -> Result<u64, SyncError> {
        let conn = self.conn.lock().expect("metadata store mutex poisoned");
        conn.query_row("SELECT COUNT(*) FROM file_metadata", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| count as u64)
        .map_err(|err| SyncError::Metadata(err.to_string()))
    }

    /// Most recent processing date across all records. Diagnostic only.
    pub fn max_processed_date(&self) -> Result<Option<String>, SyncError> {
        let conn = self.conn.lock().expect("metadata store mutex poisoned");
        conn.query_row("SELECT MAX(last_processed) FROM file_metadata", [], |row| {
            row.get::<_, Option<String>>(0)
        })
        .map_err(|err| SyncError::Metadata(err.to_string()))
    }
}
