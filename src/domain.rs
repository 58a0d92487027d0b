use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Catalog identifier for one dataset. Doubles as the artifact file stem,
/// so only filesystem-safe characters are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{identifier}.csv`, shared by the raw and processed artifacts.
    pub fn filename(&self) -> String {
        format!("{}.csv", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && trimmed.chars().any(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(SyncError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One dataset descriptor as the catalog serves it. Everything is optional
/// here; `CatalogItem::from_record` decides what is usable.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRecord {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub theme: Vec<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub distribution: Vec<DistributionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionRecord {
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<String>,
}

/// A validated catalog entry: every field the sync engine relies on is
/// present and well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: DatasetId,
    pub title: String,
    pub theme: Vec<String>,
    pub modified: String,
    pub download_url: String,
}

impl CatalogItem {
    /// Validates a raw record, taking the download URL from the first
    /// distribution entry. Returns `None` for records the sync engine
    /// cannot act on.
    pub fn from_record(record: DatasetRecord) -> Option<Self> {
        let id: DatasetId = record.identifier.as_deref()?.parse().ok()?;
        let modified = record.modified?;
        if modified.trim().is_empty() {
            return None;
        }
        let download_url = record
            .distribution
            .first()
            .and_then(|dist| dist.download_url.clone())?;
        Some(Self {
            id,
            title: record.title.unwrap_or_default(),
            theme: record.theme,
            modified,
            download_url,
        })
    }

    /// Case-insensitive domain predicate: any theme tag contains the
    /// keyword, or the title does.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.theme
            .iter()
            .any(|tag| tag.to_lowercase().contains(&keyword))
            || self.title.to_lowercase().contains(&keyword)
    }
}
