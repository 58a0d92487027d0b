use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::batch::{ProgressEvent, ProgressSink};
use crate::domain::{CatalogItem, DatasetRecord};
use crate::error::SyncError;

/// Remote catalog capability: one listing request plus per-dataset table
/// downloads. Implemented over HTTP in production and by in-memory fakes in
/// tests.
pub trait CatalogClient: Send + Sync {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, SyncError>;
    fn download_table(&self, url: &str) -> Result<Vec<u8>, SyncError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for &C {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, SyncError> {
        (**self).list_datasets()
    }

    fn download_table(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        (**self).download_table(url)
    }
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    catalog_url: String,
}

impl CatalogHttpClient {
    pub fn new(catalog_url: impl Into<String>) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cms-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            catalog_url: catalog_url.into(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, reqwest::Error>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl CatalogClient for CatalogHttpClient {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, SyncError> {
        let response = self
            .send_with_retries(|| self.client.get(&self.catalog_url))
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(SyncError::CatalogStatus { status, message });
        }
        response
            .json::<Vec<DatasetRecord>>()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))
    }

    fn download_table(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self
            .send_with_retries(|| self.client.get(url))
            .map_err(|err| SyncError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(SyncError::DownloadStatus { status, message });
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SyncError::DownloadHttp(err.to_string()))
    }
}

/// Selects catalog entries whose theme or title matches the configured
/// keyword. A transiently unreachable catalog is reported and yields an
/// empty candidate list; it must not take a scheduled run down with it.
pub struct CatalogFilter<'a, C: CatalogClient> {
    client: &'a C,
    keyword: String,
}

impl<'a, C: CatalogClient> CatalogFilter<'a, C> {
    pub fn new(client: &'a C, keyword: impl Into<String>) -> Self {
        Self {
            client,
            keyword: keyword.into(),
        }
    }

    pub fn candidates(&self, sink: &dyn ProgressSink) -> Vec<CatalogItem> {
        let records = match self.client.list_datasets() {
            Ok(records) => records,
            Err(err) => {
                sink.event(ProgressEvent {
                    message: format!("catalog listing failed: {err}"),
                    elapsed: None,
                });
                return Vec::new();
            }
        };

        let mut skipped = 0usize;
        let mut items = Vec::new();
        for record in records {
            match CatalogItem::from_record(record) {
                Some(item) => items.push(item),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            sink.event(ProgressEvent {
                message: format!("skipped {skipped} malformed catalog entries"),
                elapsed: None,
            });
        }

        let candidates: Vec<CatalogItem> = items
            .into_iter()
            .filter(|item| item.matches_keyword(&self.keyword))
            .collect();
        sink.event(ProgressEvent {
            message: format!(
                "found {} datasets matching keyword \"{}\"",
                candidates.len(),
                self.keyword
            ),
            elapsed: None,
        });
        candidates
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
