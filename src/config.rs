use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_WORKERS;
use crate::error::SyncError;

pub const DEFAULT_CATALOG_URL: &str =
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";
pub const DEFAULT_KEYWORD: &str = "hospital";
pub const DEFAULT_DATA_DIR: &str = "data";

/// On-disk config shape; every field optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_url: String,
    pub keyword: String,
    pub data_dir: Utf8PathBuf,
    pub workers: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves from an explicit path, the default `cms-sync.json` if one
    /// exists, or built-in defaults. The sync job is expected to run
    /// unattended, so a missing default config is not an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("cms-sync.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Self::resolve_config(Config::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SyncError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            keyword: config.keyword.unwrap_or_else(|| DEFAULT_KEYWORD.to_string()),
            data_dir: config
                .data_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR)),
            workers: config.workers.unwrap_or(DEFAULT_WORKERS).max(1),
        }
    }
}
