use regex::Regex;

use crate::error::SyncError;

/// Rewrites identifier-style column names to lowercase snake_case.
///
/// Two boundary passes before lowercasing: one between a lowercase/digit and
/// a following uppercase ("patientId"), one between an acronym run and a
/// capitalized word ("ZIPCode"). Both captures are alphanumeric-restricted,
/// so names that already carry separators ("Facility Name") are only
/// lowercased, never given a second separator.
pub struct SnakeCaser {
    lower_upper: Regex,
    acronym_word: Regex,
}

impl SnakeCaser {
    pub fn new() -> Self {
        Self {
            lower_upper: Regex::new(r"([a-z0-9])([A-Z])").unwrap(),
            acronym_word: Regex::new(r"([A-Za-z0-9])([A-Z][a-z])").unwrap(),
        }
    }

    pub fn convert(&self, name: &str) -> String {
        let name = self.lower_upper.replace_all(name, "${1}_${2}");
        let name = self.acronym_word.replace_all(&name, "${1}_${2}");
        name.to_lowercase()
    }
}

impl Default for SnakeCaser {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies a CSV table, rewriting only the header row. Records pass through
/// unchanged; ragged rows are tolerated on both ends.
pub fn normalize_table(raw: &[u8]) -> Result<Vec<u8>, SyncError> {
    let caser = SnakeCaser::new();
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(raw);
    let headers = reader
        .headers()
        .map_err(|err| SyncError::Csv(err.to_string()))?;
    let normalized: Vec<String> = headers.iter().map(|name| caser.convert(name)).collect();

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(&normalized)
        .map_err(|err| SyncError::Csv(err.to_string()))?;
    for record in reader.into_byte_records() {
        let record = record.map_err(|err| SyncError::Csv(err.to_string()))?;
        writer
            .write_byte_record(&record)
            .map_err(|err| SyncError::Csv(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| SyncError::Csv(err.to_string()))
}
