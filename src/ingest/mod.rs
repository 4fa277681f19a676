// Nightly results ingestion
//
// Turns the load-test reports under the nightly results tree into rows of the
// per-test-type CSV files the change-point detector consumes:
// - path: <root>/<YYYY_MM_DD>/<test_type>/.../performance-report.json grammar
// - report: phase merge and unit stripping for the eleven tracked metrics
// - csv_table: header-aligned append and whole-table rebuild
// - nightly: date selection, provenance, one row per test type, backfill

mod csv_table;
mod error;
mod nightly;
mod path;
mod report;

pub use csv_table::{append_row, append_row_once, escape_field, split_record, write_table, CsvRow};
pub use error::{IngestError, Result};
pub use nightly::{
    build_row, find_report, latest_run_date, report_row, run_backfill, run_dates, run_ingest,
    run_time, BackfillReport, IngestReport, HARNESS_COMMIT_COLUMN, PRIMARY_COMMIT_COLUMN,
    TIME_COLUMN,
};
pub use path::{parse_date_dir, ReportPath, DATE_DIR_PATTERN, REPORT_FILE_NAME};
pub use report::{strip_unit, PerformanceReport};
