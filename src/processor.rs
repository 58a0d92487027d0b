use std::time::Instant;

use serde::Serialize;

use crate::batch::{ProgressEvent, ProgressSink};
use crate::catalog::CatalogClient;
use crate::detect::needs_update;
use crate::domain::CatalogItem;
use crate::error::SyncError;
use crate::metadata::{MetadataStore, SyncRecord};
use crate::normalize;
use crate::store::DataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Downloaded,
    UpToDate,
    Failed,
}

/// Result of one per-item processing attempt. Failures are data here, not
/// errors: a bad dataset is reported and the batch moves on.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: String,
    pub filename: String,
    pub outcome: Outcome,
    pub error: Option<String>,
}

/// Downloads, normalizes, and records a single dataset. The metadata row is
/// written only after both artifacts are on disk, so a crash mid-item leaves
/// at worst a stale record that the next run repairs.
pub struct ItemProcessor<'a, C: CatalogClient> {
    client: &'a C,
    data: &'a DataStore,
    store: &'a MetadataStore,
}

impl<'a, C: CatalogClient> ItemProcessor<'a, C> {
    pub fn new(client: &'a C, data: &'a DataStore, store: &'a MetadataStore) -> Self {
        Self {
            client,
            data,
            store,
        }
    }

    pub fn process(&self, item: &CatalogItem, sink: &dyn ProgressSink) -> ItemReport {
        let filename = item.id.filename();

        // Re-checked here even though the coordinator already filtered, so a
        // duplicate identifier in one work list resolves to a single download.
        if !needs_update(item, self.data, self.store, sink) {
            sink.event(ProgressEvent {
                message: format!("skipping {filename} - already up to date"),
                elapsed: None,
            });
            return ItemReport {
                id: item.id.to_string(),
                filename,
                outcome: Outcome::UpToDate,
                error: None,
            };
        }

        match self.refresh(item, &filename, sink) {
            Ok(()) => ItemReport {
                id: item.id.to_string(),
                filename,
                outcome: Outcome::Downloaded,
                error: None,
            },
            Err(err) => {
                sink.event(ProgressEvent {
                    message: format!("error processing dataset {}: {err}", item.id),
                    elapsed: None,
                });
                ItemReport {
                    id: item.id.to_string(),
                    filename,
                    outcome: Outcome::Failed,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn refresh(
        &self,
        item: &CatalogItem,
        filename: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), SyncError> {
        sink.event(ProgressEvent {
            message: format!("downloading {filename}"),
            elapsed: None,
        });
        let start = Instant::now();

        let raw = self.client.download_table(&item.download_url)?;
        DataStore::write_bytes_atomic(&self.data.raw_path(&item.id), &raw)?;

        let processed = normalize::normalize_table(&raw)?;
        DataStore::write_bytes_atomic(&self.data.processed_path(&item.id), &processed)?;

        self.store.upsert(&SyncRecord {
            file_id: item.id.to_string(),
            filename: filename.to_string(),
            last_modified: item.modified.clone(),
            last_processed: today(),
        })?;

        sink.event(ProgressEvent {
            message: format!("successfully processed {filename}"),
            elapsed: Some(start.elapsed()),
        });
        Ok(())
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
