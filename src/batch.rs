use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::catalog::{CatalogClient, CatalogFilter};
use crate::detect::needs_update;
use crate::domain::CatalogItem;
use crate::error::SyncError;
use crate::metadata::MetadataStore;
use crate::processor::{ItemProcessor, ItemReport, Outcome};
use crate::store::DataStore;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Explicit reporting dependency threaded through every component; there is
/// no ambient logger inside the library.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Sink that discards all events.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Cooperative cancellation handle shared between the coordinator and
/// whatever owns the interrupt source (a signal handler in the CLI).
/// Workers stop claiming new items once set; in-flight items run to
/// completion.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Underlying flag, for wiring into a signal handler.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Claim-based distribution of the work list: each worker atomically takes
/// the next unclaimed item, so the worker budget bounds concurrency without
/// any per-item locking.
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn claim(&self) -> Option<&T> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub downloaded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub reports: Vec<ItemReport>,
}

impl RunSummary {
    fn from_reports(reports: Vec<ItemReport>) -> Self {
        let mut summary = Self {
            attempted: reports.len(),
            ..Self::default()
        };
        for report in &reports {
            match report.outcome {
                Outcome::Downloaded => summary.downloaded += 1,
                Outcome::UpToDate => summary.up_to_date += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        summary.reports = reports;
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub datasets: u64,
    pub last_processed: Option<String>,
}

/// Default worker budget for the fan-out phase.
pub const DEFAULT_WORKERS: usize = 5;

/// Drives one full sync cycle: discover candidates, decide what is stale,
/// fan the work out to a bounded pool, and summarize. Per-item failures are
/// contained by the processor; only store access outside any per-item scope
/// can fail the run.
pub struct BatchCoordinator<C: CatalogClient> {
    client: C,
    data: DataStore,
    store: MetadataStore,
    keyword: String,
    workers: usize,
    cancel: CancelFlag,
}

impl<C: CatalogClient> BatchCoordinator<C> {
    pub fn new(
        client: C,
        data: DataStore,
        store: MetadataStore,
        keyword: impl Into<String>,
        workers: usize,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            client,
            data,
            store,
            keyword: keyword.into(),
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunSummary, SyncError> {
        self.data.ensure_layout()?;
        self.report_existing_state(sink)?;

        let filter = CatalogFilter::new(&self.client, self.keyword.clone());
        let candidates = filter.candidates(sink);

        let work: Vec<CatalogItem> = candidates
            .into_iter()
            .filter(|item| needs_update(item, &self.data, &self.store, sink))
            .collect();

        if work.is_empty() {
            sink.event(ProgressEvent {
                message: "all datasets are up to date".to_string(),
                elapsed: None,
            });
            return Ok(RunSummary::default());
        }

        sink.event(ProgressEvent {
            message: format!("processing {} datasets", work.len()),
            elapsed: None,
        });

        let queue = WorkQueue::new(work);
        let processor = ItemProcessor::new(&self.client, &self.data, &self.store);
        let reports: Mutex<Vec<ItemReport>> = Mutex::new(Vec::with_capacity(queue.len()));
        let workers = self.workers.min(queue.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while let Some(item) = queue.claim() {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        let report = processor.process(item, sink);
                        reports
                            .lock()
                            .expect("worker thread panicked")
                            .push(report);
                    }
                });
            }
        });

        let reports = reports.into_inner().expect("worker thread panicked");
        let summary = RunSummary::from_reports(reports);
        sink.event(ProgressEvent {
            message: format!(
                "batch complete: {} downloaded, {} up to date, {} failed",
                summary.downloaded, summary.up_to_date, summary.failed
            ),
            elapsed: None,
        });
        Ok(summary)
    }

    /// Aggregate store introspection for the CLI.
    pub fn status(&self) -> Result<StatusReport, SyncError> {
        Ok(StatusReport {
            datasets: self.store.count()?,
            last_processed: self.store.max_processed_date()?,
        })
    }

    fn report_existing_state(&self, sink: &dyn ProgressSink) -> Result<(), SyncError> {
        let count = self.store.count()?;
        if count == 0 {
            sink.event(ProgressEvent {
                message: "no prior sync state; initial download required".to_string(),
                elapsed: None,
            });
            return Ok(());
        }

        let mut message = format!("{count} datasets recorded; checking for updates");
        if let Some(last) = self.store.max_processed_date()? {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(&last, "%Y-%m-%d") {
                let days = (chrono::Local::now().date_naive() - date).num_days();
                message = format!("{count} datasets recorded, last updated {days} days ago");
            }
        }
        sink.event(ProgressEvent {
            message,
            elapsed: None,
        });
        Ok(())
    }
}
