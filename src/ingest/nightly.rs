// Nightly ingestion driver
//
// For the chosen run date, each configured test type contributes at most one
// row: the first performance report under <root>/<date>/<test_type>, plus the
// run time and both commit hashes. Provenance is resolved once per date.
// A backfill walks every date directory in order and rebuilds each CSV.

use crate::config::PipelineConfig;
use crate::ingest::csv_table::{append_row_once, write_table, CsvRow};
use crate::ingest::error::{io_error, IngestError, Result};
use crate::ingest::path::{parse_date_dir, ReportPath, REPORT_FILE_NAME};
use crate::ingest::report::PerformanceReport;
use crate::provenance::{date_dir_name, find_files, Provenance, ProvenanceSources};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub const TIME_COLUMN: &str = "time";
pub const PRIMARY_COMMIT_COLUMN: &str = "commit";
pub const HARNESS_COMMIT_COLUMN: &str = "fallout_tests_commit";

/// Outcome of one ingestion run
#[derive(Debug)]
pub struct IngestReport {
    pub date: NaiveDate,
    /// (test type, CSV file) for every appended row
    pub appended: Vec<(String, PathBuf)>,
    /// Test types whose CSV already ends with this date's row
    pub already_present: Vec<String>,
    /// Test types with no report for the date
    pub skipped: Vec<String>,
    /// Test types whose report could not be used
    pub failed: Vec<(String, IngestError)>,
}

/// Outcome of a backfill over every run date
#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Run dates visited, oldest first
    pub dates: Vec<NaiveDate>,
    /// (test type, CSV file, rows) for every rebuilt file
    pub written: Vec<(String, PathBuf, usize)>,
    /// Test types with no report on a date
    pub skipped: Vec<(NaiveDate, String)>,
    /// Reports that could not be used
    pub failed: Vec<(NaiveDate, String, IngestError)>,
}

/// Every `YYYY_MM_DD` directory under `root`, oldest first
pub fn run_dates(root: &Path) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    for entry in fs::read_dir(root).map_err(|source| io_error(root, source))? {
        let entry = entry.map_err(|source| io_error(root, source))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(date) = entry.file_name().to_str().and_then(parse_date_dir) {
            dates.push(date);
        }
    }
    dates.sort();
    Ok(dates)
}

/// Newest `YYYY_MM_DD` directory under `root`
pub fn latest_run_date(root: &Path) -> Result<Option<NaiveDate>> {
    Ok(run_dates(root)?.pop())
}

/// First performance report for `test_type` on `date`, if any
pub fn find_report(root: &Path, date: NaiveDate, test_type: &str) -> Result<Option<ReportPath>> {
    let dir = root.join(date_dir_name(date)).join(test_type);
    if !dir.is_dir() {
        return Ok(None);
    }

    let reports = find_files(&dir, &mut |path: &Path| {
        path.file_name().and_then(|n| n.to_str()) == Some(REPORT_FILE_NAME)
    })
    .map_err(|source| io_error(&dir, source))?;

    match reports.first() {
        Some(path) => ReportPath::parse(root, path).map(Some),
        None => Ok(None),
    }
}

/// Row for one report: metric cells, then run time and commits
pub fn build_row(report: &PerformanceReport, time: &str, provenance: &Provenance) -> Result<CsvRow> {
    let mut row: CsvRow = report.metric_cells()?.into_iter().collect();
    row.push(TIME_COLUMN, time);
    row.push(PRIMARY_COMMIT_COLUMN, provenance.primary_commit.as_str());
    row.push(HARNESS_COMMIT_COLUMN, provenance.harness_commit.as_str());
    Ok(row)
}

/// Row for `test_type` on `date`, or None when the run has no report
pub fn report_row(
    root: &Path,
    date: NaiveDate,
    test_type: &str,
    time: &str,
    provenance: &Provenance,
) -> Result<Option<CsvRow>> {
    let Some(report_path) = find_report(root, date, test_type)? else {
        return Ok(None);
    };
    let report = PerformanceReport::from_file(&report_path.path)?;
    build_row(&report, time, provenance).map(Some)
}

/// Time cell for a run date, e.g. `2023-04-16 23:00:00 +0000`
pub fn run_time(config: &PipelineConfig, date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.format("%Y-%m-%d"),
        config.ingest.run_time_of_day,
        config.ingest.utc_offset
    )
}

/// Append the nightly results for `date` (default: latest) to the CSV inputs
pub fn run_ingest(
    config: &PipelineConfig,
    sources: &ProvenanceSources,
    date: Option<NaiveDate>,
) -> anyhow::Result<IngestReport> {
    let root = &config.nightly_results_dir;
    let date = match date {
        Some(date) => date,
        None => latest_run_date(root)?
            .ok_or_else(|| anyhow::anyhow!("No run date directories in {}", root.display()))?,
    };
    tracing::info!("Ingesting results for {}", date_dir_name(date));

    let provenance = sources.resolve(date);
    let time = run_time(config, date);

    let mut outcome = IngestReport {
        date,
        appended: Vec::new(),
        already_present: Vec::new(),
        skipped: Vec::new(),
        failed: Vec::new(),
    };

    for test_type in &config.ingest.test_types {
        let row = match report_row(root, date, test_type, &time, &provenance) {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::warn!("{}: no {} for {}", test_type, REPORT_FILE_NAME, date);
                outcome.skipped.push(test_type.clone());
                continue;
            }
            Err(e) => {
                tracing::error!("{}: {}", test_type, e);
                outcome.failed.push((test_type.clone(), e));
                continue;
            }
        };

        let csv_path = config.ingest.csv_path(test_type);
        if append_row_once(&csv_path, &row, TIME_COLUMN)? {
            tracing::info!("{}: appended row to {}", test_type, csv_path.display());
            outcome.appended.push((test_type.clone(), csv_path));
        } else {
            tracing::info!("{}: {} already ends with {}", test_type, csv_path.display(), time);
            outcome.already_present.push(test_type.clone());
        }
    }

    Ok(outcome)
}

/// Rebuild every CSV from all run dates under the nightly results tree
///
/// Dates are visited oldest first. A test type with no report on any date
/// leaves its CSV untouched.
pub fn run_backfill(
    config: &PipelineConfig,
    sources: &ProvenanceSources,
) -> anyhow::Result<BackfillReport> {
    let root = &config.nightly_results_dir;
    let dates = run_dates(root)?;
    if dates.is_empty() {
        anyhow::bail!("No run date directories in {}", root.display());
    }
    tracing::info!(
        "Backfilling {} run dates ({} to {})",
        dates.len(),
        dates[0],
        dates[dates.len() - 1]
    );

    let test_types = &config.ingest.test_types;
    let mut tables: Vec<Vec<CsvRow>> = vec![Vec::new(); test_types.len()];
    let mut outcome = BackfillReport::default();

    for &date in &dates {
        let provenance = sources.resolve(date);
        let time = run_time(config, date);

        for (test_type, rows) in test_types.iter().zip(tables.iter_mut()) {
            match report_row(root, date, test_type, &time, &provenance) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    tracing::debug!("{}: no {} for {}", test_type, REPORT_FILE_NAME, date);
                    outcome.skipped.push((date, test_type.clone()));
                }
                Err(e) => {
                    tracing::error!("{} on {}: {}", test_type, date, e);
                    outcome.failed.push((date, test_type.clone(), e));
                }
            }
        }
    }

    for (test_type, rows) in test_types.iter().zip(&tables) {
        if rows.is_empty() {
            tracing::warn!("{}: no reports on any run date", test_type);
            continue;
        }
        let csv_path = config.ingest.csv_path(test_type);
        write_table(&csv_path, rows)?;
        tracing::info!("{}: wrote {} rows to {}", test_type, rows.len(), csv_path.display());
        outcome.written.push((test_type.clone(), csv_path, rows.len()));
    }

    outcome.dates = dates;
    Ok(outcome)
}
