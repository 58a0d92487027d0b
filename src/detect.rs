use crate::batch::{ProgressEvent, ProgressSink};
use crate::domain::CatalogItem;
use crate::metadata::MetadataStore;
use crate::store::DataStore;

/// Decides whether a catalog item must be (re)downloaded.
///
/// A missing raw artifact always forces a refresh, covering both first runs
/// and externally deleted files. Otherwise the catalog's `modified` string
/// is compared lexically against the recorded one; the catalog serves a
/// fixed sortable date format, so string order is date order. A store read
/// failure counts as "needs update" — a redundant download is cheaper than
/// silently keeping stale data.
pub fn needs_update(
    item: &CatalogItem,
    data: &DataStore,
    store: &MetadataStore,
    sink: &dyn ProgressSink,
) -> bool {
    if !data.raw_exists(&item.id) {
        return true;
    }

    match store.get(&item.id) {
        Ok(Some(record)) => item.modified > record.last_modified,
        Ok(None) => true,
        Err(err) => {
            sink.event(ProgressEvent {
                message: format!("update check failed for {}: {err}", item.id),
                elapsed: None,
            });
            true
        }
    }
}
