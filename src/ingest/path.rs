// Results tree path grammar
//
//   <root>/<YYYY_MM_DD>/<test_type>/.../performance-report.json
//
// The date and test type are recovered from named positions relative to the
// root, never from absolute component indices.

use crate::ingest::error::{IngestError, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "performance-report.json";

/// Pattern for run date directory names
pub const DATE_DIR_PATTERN: &str = r"^\d{4}_\d{2}_\d{2}$";

/// Parse a `YYYY_MM_DD` directory name
pub fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    let pattern = Regex::new(DATE_DIR_PATTERN).ok()?;
    if !pattern.is_match(name) {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y_%m_%d").ok()
}

/// Location of one performance report in the results tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPath {
    pub date: NaiveDate,
    pub test_type: String,
    pub path: PathBuf,
}

impl ReportPath {
    pub fn parse(root: &Path, path: &Path) -> Result<Self> {
        let malformed = |reason: &str| IngestError::MalformedPath {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let relative = path
            .strip_prefix(root)
            .map_err(|_| malformed("not under the results root"))?;

        let names: Vec<&str> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();

        if names.len() < 3 {
            return Err(malformed("expected <date>/<test_type>/.../performance-report.json"));
        }
        if names[names.len() - 1] != REPORT_FILE_NAME {
            return Err(malformed("not a performance report"));
        }

        let date = parse_date_dir(names[0]).ok_or_else(|| malformed("bad date directory"))?;
        let test_type = names[1];
        if test_type.is_empty() {
            return Err(malformed("empty test type"));
        }

        Ok(Self {
            date,
            test_type: test_type.to_string(),
            path: path.to_path_buf(),
        })
    }
}
