use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::DatasetId;
use crate::error::SyncError;

/// Filesystem layout for the sync engine: raw artifacts, processed
/// artifacts, and the metadata database all live under one base directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    base: Utf8PathBuf,
}

impl DataStore {
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.base.join("raw")
    }

    pub fn processed_dir(&self) -> Utf8PathBuf {
        self.base.join("processed")
    }

    pub fn metadata_dir(&self) -> Utf8PathBuf {
        self.base.join("metadata")
    }

    pub fn raw_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.raw_dir().join(id.filename())
    }

    pub fn processed_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.processed_dir().join(id.filename())
    }

    pub fn metadata_db_path(&self) -> Utf8PathBuf {
        self.metadata_dir().join("metadata.db")
    }

    pub fn raw_exists(&self, id: &DatasetId) -> bool {
        self.raw_path(id).as_std_path().exists()
    }

    /// Creates the raw/processed/metadata directories. Safe to call on a
    /// populated layout; existing files are untouched.
    pub fn ensure_layout(&self) -> Result<(), SyncError> {
        for dir in [self.raw_dir(), self.processed_dir(), self.metadata_dir()] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    /// Writes via a sibling temp file and rename, so readers never observe
    /// a half-written artifact.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SyncError> {
        let parent = path
            .parent()
            .ok_or_else(|| SyncError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".cms-sync")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| SyncError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = DataStore::new("data");
        let id: DatasetId = "xubh-q36u".parse().unwrap();

        assert_eq!(store.raw_path(&id), "data/raw/xubh-q36u.csv");
        assert_eq!(store.processed_path(&id), "data/processed/xubh-q36u.csv");
        assert_eq!(store.metadata_db_path(), "data/metadata/metadata.db");
    }

    #[test]
    fn ensure_layout_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
        let store = DataStore::new(base);

        store.ensure_layout().unwrap();
        let id: DatasetId = "xubh-q36u".parse().unwrap();
        DataStore::write_bytes_atomic(&store.raw_path(&id), b"a,b\n1,2\n").unwrap();

        store.ensure_layout().unwrap();
        assert!(store.raw_exists(&id));
        assert_eq!(
            fs::read(store.raw_path(&id).as_std_path()).unwrap(),
            b"a,b\n1,2\n"
        );
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
        let store = DataStore::new(base);
        let id: DatasetId = "xubh-q36u".parse().unwrap();

        DataStore::write_bytes_atomic(&store.raw_path(&id), b"old").unwrap();
        DataStore::write_bytes_atomic(&store.raw_path(&id), b"new").unwrap();
        assert_eq!(fs::read(store.raw_path(&id).as_std_path()).unwrap(), b"new");
    }
}
