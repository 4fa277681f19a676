//! Change-point detector output
//!
//! The detector appends one JSON document per run to a results file. Only the
//! last line (the most recent run) is consumed. Each document maps a test type
//! to the timestamps at which the detector found change points:
//!
//! ```json
//! {"lwt-fixed-100-partitions": [
//!   {"time": "2022-01-01 23:00:00 +0000",
//!    "changes": [{"metric": "p99", "forward_change_percent": "30"}]}
//! ]}
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors reading detector results
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Detector results file {0} contains no runs")]
    Empty(String),

    #[error("Invalid detector JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A single change reported for one metric at one timestamp
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawChange {
    pub metric: String,
    /// Signed percent change, kept in the detector's own spelling
    #[serde(deserialize_with = "percent_text")]
    pub forward_change_percent: String,
}

/// All changes the detector reported at one run timestamp
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTimeEntry {
    pub time: String,
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

/// One detector run: test type → ordered change-point entries
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawDetectorBatch {
    pub tests: BTreeMap<String, Vec<RawTimeEntry>>,
}

impl RawDetectorBatch {
    /// Parse a single JSON document (one line of a results file)
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Parse the most recent run from JSON-lines content
    pub fn from_jsonl_str(content: &str, origin: &str) -> Result<Self, DetectorError> {
        let (index, last) = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .last()
            .ok_or_else(|| DetectorError::Empty(origin.to_string()))?;

        Self::from_json_line(last).map_err(|source| DetectorError::Json {
            line: index + 1,
            source,
        })
    }

    /// Read the most recent run from a JSON-lines results file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DetectorError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_jsonl_str(&content, &path.display().to_string())
    }

    /// True when the detector found nothing for any test type
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Merge another batch into this one, keeping entries from both
    pub fn merge(&mut self, other: RawDetectorBatch) {
        for (test_type, entries) in other.tests {
            self.tests.entry(test_type).or_default().extend(entries);
        }
    }

    /// Total number of individual changes across all tests and timestamps
    pub fn change_count(&self) -> usize {
        self.tests
            .values()
            .flat_map(|entries| entries.iter())
            .map(|entry| entry.changes.len())
            .sum()
    }
}

/// The detector writes percentages as strings, older runs as numbers
fn percent_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Percent {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Percent::deserialize(deserializer)? {
        Percent::Text(text) => text,
        Percent::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_single_document() {
        let line = r#"{"lwt-fixed-100-partitions": [{"time": "2022-01-01 23:00:00 +0000", "changes": [{"metric": "p99", "forward_change_percent": "30"}]}]}"#;
        let batch = RawDetectorBatch::from_json_line(line).unwrap();

        let entries = &batch.tests["lwt-fixed-100-partitions"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time, "2022-01-01 23:00:00 +0000");
        assert_eq!(entries[0].changes[0].metric, "p99");
        assert_eq!(entries[0].changes[0].forward_change_percent, "30");
    }

    #[test]
    fn test_numeric_percent_is_accepted() {
        let line = r#"{"t": [{"time": "2022-01-01 23:00:00", "changes": [{"metric": "avgLat", "forward_change_percent": -12.5}]}]}"#;
        let batch = RawDetectorBatch::from_json_line(line).unwrap();
        assert_eq!(batch.tests["t"][0].changes[0].forward_change_percent, "-12.5");
    }

    #[test]
    fn test_missing_changes_defaults_to_empty() {
        let line = r#"{"t": [{"time": "2022-01-01 23:00:00"}]}"#;
        let batch = RawDetectorBatch::from_json_line(line).unwrap();
        assert!(batch.tests["t"][0].changes.is_empty());
        assert_eq!(batch.change_count(), 0);
    }

    #[test]
    fn test_empty_object_is_empty_batch() {
        let batch = RawDetectorBatch::from_json_line("{}").unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_only_last_line_is_consumed() {
        let content = concat!(
            r#"{"old": [{"time": "2022-01-01 23:00:00", "changes": []}]}"#,
            "\n",
            r#"{"new": [{"time": "2022-01-02 23:00:00", "changes": []}]}"#,
            "\n\n"
        );
        let batch = RawDetectorBatch::from_jsonl_str(content, "inline").unwrap();
        assert!(batch.tests.contains_key("new"));
        assert!(!batch.tests.contains_key("old"));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let err = RawDetectorBatch::from_jsonl_str("\n  \n", "results.json").unwrap_err();
        assert!(matches!(err, DetectorError::Empty(_)));
    }

    #[test]
    fn test_invalid_json_reports_line() {
        let content = "{}\n{not json";
        match RawDetectorBatch::from_jsonl_str(content, "inline").unwrap_err() {
            DetectorError::Json { line, .. } => assert_eq!(line, 2),
            other => panic!("Expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hunter_result_fixed_100.json");
        fs::write(
            &path,
            r#"{"lwt-fixed-100-partitions": [{"time": "2022-01-01 23:00:00", "changes": [{"metric": "opRate", "forward_change_percent": "-20"}]}]}"#,
        )
        .unwrap();

        let batch = RawDetectorBatch::from_file(&path).unwrap();
        assert_eq!(batch.change_count(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = RawDetectorBatch::from_file(temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DetectorError::Io { .. }));
    }

    #[test]
    fn test_merge_concatenates_entries() {
        let mut first = RawDetectorBatch::from_json_line(
            r#"{"a": [{"time": "2022-01-01 23:00:00", "changes": []}]}"#,
        )
        .unwrap();
        let second = RawDetectorBatch::from_json_line(
            r#"{"a": [{"time": "2022-01-02 23:00:00", "changes": []}], "b": []}"#,
        )
        .unwrap();

        first.merge(second);
        assert_eq!(first.tests["a"].len(), 2);
        assert!(first.tests.contains_key("b"));
    }
}
