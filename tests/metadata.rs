use camino::Utf8PathBuf;

use cms_dataset_sync::domain::DatasetId;
use cms_dataset_sync::metadata::{MetadataStore, SyncRecord};

fn record(id: &str, modified: &str) -> SyncRecord {
    SyncRecord {
        file_id: id.to_string(),
        filename: format!("{id}.csv"),
        last_modified: modified.to_string(),
        last_processed: "2024-03-02".to_string(),
    }
}

#[test]
fn records_survive_reopening_the_store() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("metadata.db")).unwrap();
    let id: DatasetId = "xubh-q36u".parse().unwrap();

    {
        let store = MetadataStore::open(&path).unwrap();
        store.upsert(&record("xubh-q36u", "2024-03-01")).unwrap();
    }

    let reopened = MetadataStore::open(&path).unwrap();
    let found = reopened.get(&id).unwrap().unwrap();
    assert_eq!(found.last_modified, "2024-03-01");
    assert_eq!(reopened.count().unwrap(), 1);
}

#[test]
fn reopening_does_not_reset_existing_rows() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("metadata.db")).unwrap();

    let store = MetadataStore::open(&path).unwrap();
    store.upsert(&record("aaaa-1111", "2024-01-01")).unwrap();
    store.upsert(&record("bbbb-2222", "2024-02-01")).unwrap();
    drop(store);

    for _ in 0..3 {
        let store = MetadataStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }
}

#[test]
fn concurrent_upserts_for_distinct_keys_all_land() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("metadata.db")).unwrap();
    let store = MetadataStore::open(&path).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for item in 0..5 {
                    store
                        .upsert(&record(&format!("ds-{worker}-{item}"), "2024-03-01"))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(store.count().unwrap(), 20);
}

#[test]
fn same_key_upserts_end_last_writer_wins() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("metadata.db")).unwrap();
    let store = MetadataStore::open(&path).unwrap();
    let id: DatasetId = "xubh-q36u".parse().unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for day in 1..=9 {
                    store
                        .upsert(&record("xubh-q36u", &format!("2024-03-0{day}")))
                        .unwrap();
                }
            });
        }
    });

    let found = store.get(&id).unwrap().unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert!(found.last_modified.starts_with("2024-03-0"));
    assert_eq!(found.filename, "xubh-q36u.csv");
}
