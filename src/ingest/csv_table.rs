//! Appending rows to the detector's CSV inputs
//!
//! The detector reads one CSV per test type. An existing file's header fixes
//! the column order; cells for columns the row does not carry are left empty
//! and row columns missing from the header are dropped with a warning. A new
//! file gets a header in the row's own column order. A rebuild replaces the
//! whole file at once.

use crate::ingest::error::{io_error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One CSV row as (column, value) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRow {
    cells: Vec<(String, String)>,
}

impl CsvRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell; a repeated column replaces the earlier value
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Format the row in `header` order
    pub fn format(&self, header: &[String]) -> String {
        header
            .iter()
            .map(|column| escape_field(self.get(column).unwrap_or("")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<(String, String)> for CsvRow {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut row = CsvRow::new();
        for (column, value) in iter {
            row.push(column, value);
        }
        row
    }
}

/// Escape CSV field (handle commas, quotes, newlines)
pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line, honouring quoted fields
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Append `row` to the CSV at `path`, writing a header first if the file is new
///
/// Returns the header the row was aligned to.
pub fn append_row<P: AsRef<Path>>(path: P, row: &CsvRow) -> Result<Vec<String>> {
    let path = path.as_ref();
    let existing = if path.exists() {
        fs::read_to_string(path).map_err(|source| io_error(path, source))?
    } else {
        String::new()
    };

    let mut out = String::new();
    let header: Vec<String> = match existing.lines().next().filter(|l| !l.trim().is_empty()) {
        Some(line) => {
            let header = split_record(line.trim_end_matches('\r'));
            for column in row.columns().filter(|c| !header.iter().any(|h| h == c)) {
                tracing::warn!("{}: dropping column '{}' not in header", path.display(), column);
            }
            if !existing.ends_with('\n') {
                out.push('\n');
            }
            header
        }
        None => {
            let header: Vec<String> = row.columns().map(str::to_string).collect();
            out.push_str(
                &header
                    .iter()
                    .map(|h| escape_field(h))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            out.push('\n');
            header
        }
    };

    out.push_str(&row.format(&header));
    out.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| io_error(path, source))?;
    file.write_all(out.as_bytes())
        .map_err(|source| io_error(path, source))?;

    Ok(header)
}

/// Append `row` unless the file's last row already has its `key_column` value
///
/// Returns false when the row was already present and nothing was written.
pub fn append_row_once<P: AsRef<Path>>(
    path: P,
    row: &CsvRow,
    key_column: &str,
) -> Result<bool> {
    let path = path.as_ref();
    if let Some(value) = row.get(key_column).filter(|_| path.exists()) {
        let existing = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        if last_value(&existing, key_column).as_deref() == Some(value) {
            return Ok(false);
        }
    }

    append_row(path, row)?;
    Ok(true)
}

fn last_value(content: &str, column: &str) -> Option<String> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());
    let index = split_record(lines.next()?).iter().position(|h| h == column)?;
    split_record(lines.last()?).into_iter().nth(index)
}

/// Replace the CSV at `path` with a header and `rows`
///
/// The header lists every column in order of first appearance. The table is
/// written next to `path` and renamed over it.
pub fn write_table<P: AsRef<Path>>(path: P, rows: &[CsvRow]) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut header: Vec<String> = Vec::new();
    for column in rows.iter().flat_map(|row| row.columns()) {
        if !header.iter().any(|h| h == column) {
            header.push(column.to_string());
        }
    }

    let mut out = header
        .iter()
        .map(|h| escape_field(h))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row.format(&header));
        out.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, out).map_err(|source| io_error(&staging, source))?;
    fs::rename(&staging, path).map_err(|source| io_error(path, source))?;

    Ok(header)
}
