use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use cms_dataset_sync::batch::{BatchCoordinator, CancelFlag, DEFAULT_WORKERS, NullSink};
use cms_dataset_sync::catalog::CatalogClient;
use cms_dataset_sync::domain::{DatasetId, DatasetRecord, DistributionRecord};
use cms_dataset_sync::error::SyncError;
use cms_dataset_sync::metadata::MetadataStore;
use cms_dataset_sync::processor::Outcome;
use cms_dataset_sync::store::DataStore;

struct MockCatalog {
    records: Vec<DatasetRecord>,
    tables: HashMap<String, Vec<u8>>,
    downloads: Mutex<Vec<String>>,
}

impl MockCatalog {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            tables: HashMap::new(),
            downloads: Mutex::new(Vec::new()),
        }
    }

    fn dataset(mut self, id: &str, title: &str, theme: &[&str], modified: &str, url: &str) -> Self {
        self.records.push(DatasetRecord {
            identifier: Some(id.to_string()),
            title: Some(title.to_string()),
            theme: theme.iter().map(|tag| tag.to_string()).collect(),
            modified: Some(modified.to_string()),
            distribution: vec![DistributionRecord {
                download_url: Some(url.to_string()),
            }],
        });
        self
    }

    fn table(mut self, url: &str, body: &[u8]) -> Self {
        self.tables.insert(url.to_string(), body.to_vec());
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl CatalogClient for MockCatalog {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, SyncError> {
        Ok(self.records.clone())
    }

    fn download_table(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        self.downloads.lock().unwrap().push(url.to_string());
        self.tables
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::DownloadHttp(format!("unreachable: {url}")))
    }
}

fn data_store(temp: &tempfile::TempDir) -> DataStore {
    let base = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    DataStore::new(base)
}

fn coordinator<'a>(
    catalog: &'a MockCatalog,
    data: &DataStore,
) -> BatchCoordinator<&'a MockCatalog> {
    data.ensure_layout().unwrap();
    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    BatchCoordinator::new(
        catalog,
        data.clone(),
        store,
        "hospital",
        DEFAULT_WORKERS,
        CancelFlag::new(),
    )
}

fn id(value: &str) -> DatasetId {
    value.parse().unwrap()
}

#[test]
fn first_run_processes_every_matching_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    let catalog = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital General Information",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .dataset(
            "bbbb-2222",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/b.csv",
        )
        .dataset(
            "cccc-3333",
            "Outpatient Imaging",
            &["Hospitals"],
            "2024-03-01",
            "https://example.test/c.csv",
        )
        .table("https://example.test/a.csv", b"PatientID,Score\n1,9\n")
        .table("https://example.test/b.csv", b"ZIPCode\n97201\n")
        .table("https://example.test/c.csv", b"Facility Name\nGeneral\n");

    let summary = coordinator(&catalog, &data).run(&NullSink).unwrap();
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.failed, 0);

    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    assert_eq!(store.count().unwrap(), 3);
    for dataset in ["aaaa-1111", "bbbb-2222", "cccc-3333"] {
        assert!(data.raw_exists(&id(dataset)));
        assert!(store.get(&id(dataset)).unwrap().is_some());
    }

    let processed =
        std::fs::read_to_string(data.processed_path(&id("aaaa-1111")).as_std_path()).unwrap();
    assert!(processed.starts_with("patient_id,score\n"));
}

#[test]
fn second_run_with_unchanged_catalog_downloads_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    let catalog = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .table("https://example.test/a.csv", b"A\n1\n");

    let coordinator = coordinator(&catalog, &data);
    let first = coordinator.run(&NullSink).unwrap();
    assert_eq!(first.downloaded, 1);

    let second = coordinator.run(&NullSink).unwrap();
    assert_eq!(second.attempted, 0);
    assert_eq!(catalog.download_count(), 1);
}

#[test]
fn newer_remote_timestamp_triggers_one_redownload() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);

    let before = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .table("https://example.test/a.csv", b"A\n1\n");
    coordinator(&before, &data).run(&NullSink).unwrap();

    let after = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-04-01",
            "https://example.test/a.csv",
        )
        .table("https://example.test/a.csv", b"A\n2\n");
    let summary = coordinator(&after, &data).run(&NullSink).unwrap();
    assert_eq!(summary.downloaded, 1);

    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    let record = store.get(&id("aaaa-1111")).unwrap().unwrap();
    assert_eq!(record.last_modified, "2024-04-01");
    let raw = std::fs::read(data.raw_path(&id("aaaa-1111")).as_std_path()).unwrap();
    assert_eq!(raw, b"A\n2\n");
}

#[test]
fn one_failing_download_does_not_abort_the_batch() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    let catalog = MockCatalog::new()
        .dataset(
            "good-1111",
            "Hospital General Information",
            &[],
            "2024-03-01",
            "https://example.test/good1.csv",
        )
        .dataset(
            "dead-0000",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/missing.csv",
        )
        .dataset(
            "good-2222",
            "Hospital Staffing",
            &[],
            "2024-03-01",
            "https://example.test/good2.csv",
        )
        .table("https://example.test/good1.csv", b"A\n1\n")
        .table("https://example.test/good2.csv", b"B\n2\n");

    let summary = coordinator(&catalog, &data).run(&NullSink).unwrap();
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed, 1);

    let failed = summary
        .reports
        .iter()
        .find(|report| report.outcome == Outcome::Failed)
        .unwrap();
    assert_eq!(failed.id, "dead-0000");

    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    assert!(store.get(&id("good-1111")).unwrap().is_some());
    assert!(store.get(&id("good-2222")).unwrap().is_some());
    assert!(store.get(&id("dead-0000")).unwrap().is_none());
    assert!(!data.raw_exists(&id("dead-0000")));
}

#[test]
fn keyword_filter_keeps_only_matching_datasets_across_runs() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    let catalog = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .dataset(
            "bbbb-2222",
            "Nursing Home Staffing",
            &[],
            "2024-03-01",
            "https://example.test/b.csv",
        )
        .table("https://example.test/a.csv", b"A\n1\n")
        .table("https://example.test/b.csv", b"B\n2\n");

    let coordinator = coordinator(&catalog, &data);
    let first = coordinator.run(&NullSink).unwrap();
    assert_eq!(first.downloaded, 1);
    assert!(data.raw_exists(&id("aaaa-1111")));
    assert!(!data.raw_exists(&id("bbbb-2222")));

    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    let record = store.get(&id("aaaa-1111")).unwrap().unwrap();
    assert_eq!(record.last_modified, "2024-03-01");

    let second = coordinator.run(&NullSink).unwrap();
    assert_eq!(second.attempted, 0);
    assert_eq!(catalog.download_count(), 1);
}

#[test]
fn deleted_artifact_is_restored_on_the_next_run() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    let catalog = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .table("https://example.test/a.csv", b"A\n1\n");

    let coordinator = coordinator(&catalog, &data);
    coordinator.run(&NullSink).unwrap();
    std::fs::remove_file(data.raw_path(&id("aaaa-1111")).as_std_path()).unwrap();

    let summary = coordinator.run(&NullSink).unwrap();
    assert_eq!(summary.downloaded, 1);
    assert!(data.raw_exists(&id("aaaa-1111")));
    assert_eq!(catalog.download_count(), 2);
}

#[test]
fn cancelled_batch_stops_before_dispatching() {
    let temp = tempfile::tempdir().unwrap();
    let data = data_store(&temp);
    data.ensure_layout().unwrap();
    let store = MetadataStore::open(&data.metadata_db_path()).unwrap();
    let catalog = MockCatalog::new()
        .dataset(
            "aaaa-1111",
            "Hospital Readmissions",
            &[],
            "2024-03-01",
            "https://example.test/a.csv",
        )
        .table("https://example.test/a.csv", b"A\n1\n");

    let cancel = CancelFlag::new();
    cancel.cancel();
    let coordinator = BatchCoordinator::new(
        &catalog,
        data.clone(),
        store,
        "hospital",
        DEFAULT_WORKERS,
        cancel,
    );

    let summary = coordinator.run(&NullSink).unwrap();
    assert_eq!(summary.attempted, 0);
    assert_eq!(catalog.download_count(), 0);
}
