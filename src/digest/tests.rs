// End-to-end tests for the digest stages
//
// The fixture mirrors a nightly detector run for one test type: two run
// dates, six metrics each, a mix of improvements, small regressions and
// large regressions.

use super::*;
use crate::detector::RawDetectorBatch;
use crate::metric::MetricKind;
use crate::provenance::{CommitLookup, LookupError, ProvenanceSources};
use chrono::NaiveDate;
use proptest::prelude::*;
use tempfile::TempDir;

const FIXTURE: &str = r#"{"lwt-fixed-100-partitions": [
    {"time": "2022-01-01 23:00:00", "changes": [
        {"metric": "totalOps", "forward_change_percent": "-10"},
        {"metric": "avgLat", "forward_change_percent": "20"},
        {"metric": "p99", "forward_change_percent": "30"},
        {"metric": "opRate", "forward_change_percent": "-20"},
        {"metric": "p95", "forward_change_percent": "-25"},
        {"metric": "maxLat", "forward_change_percent": "50"}]},
    {"time": "2022-01-02 23:00:00", "changes": [
        {"metric": "totalOps", "forward_change_percent": "-5"},
        {"metric": "avgLat", "forward_change_percent": "10"},
        {"metric": "p99", "forward_change_percent": "15"},
        {"metric": "opRate", "forward_change_percent": "15"},
        {"metric": "p95", "forward_change_percent": "15"},
        {"metric": "maxLat", "forward_change_percent": "30"}]}
]}"#;

struct Unresolved;

impl CommitLookup for Unresolved {
    fn name(&self) -> &str {
        "unresolved"
    }

    fn lookup(&self, date: NaiveDate) -> std::result::Result<String, LookupError> {
        Err(LookupError::NotFound(date.to_string()))
    }
}

fn unresolved_sources() -> ProvenanceSources {
    ProvenanceSources::new(Box::new(Unresolved), Box::new(Unresolved))
}

fn fixture_records() -> Vec<ChangeRecord> {
    let batch = RawDetectorBatch::from_json_line(FIXTURE).unwrap();
    let summary = summarize(&batch, &unresolved_sources());
    assert!(summary.rejected.is_empty());
    summary.records
}

fn sentence(time: &str, metric: &str, percent: &str) -> String {
    format!(
        "For the test 'lwt-fixed-100-partitions' on date and time '{time}' that ran on \
         cassandra Git commit SHA '' and on fallout-tests Git commit SHA '': \
         The metric '{metric}' changed by {percent}%."
    )
}

/// Threshold 11: the seven degrading changes above 11% are reported
///
/// Excluded: totalOps -10/-5 and avgLat +10 (at or below threshold),
/// p95 -25 and opRate +15 (improvements).
#[test]
fn test_nightly_fixture_threshold_eleven() {
    let records = fixture_records();
    assert_eq!(records.len(), 12);

    let selected = select(records, SelectionMode::Threshold(11.0));
    let result = reconcile(&selected, &NotificationLedger::default(), &RenderLabels::default());

    let mut expected = vec![
        sentence("2022-01-01 23:00:00", "avgLat", "20"),
        sentence("2022-01-01 23:00:00", "p99", "30"),
        sentence("2022-01-01 23:00:00", "opRate", "-20"),
        sentence("2022-01-01 23:00:00", "maxLat", "50"),
        sentence("2022-01-02 23:00:00", "p99", "15"),
        sentence("2022-01-02 23:00:00", "p95", "15"),
        sentence("2022-01-02 23:00:00", "maxLat", "30"),
    ];
    expected.sort();
    let mut actual = result.new_entries.clone();
    actual.sort();

    assert_eq!(actual, expected);
    assert!(!result.new_entries.iter().any(|e| e.contains("'p95' changed by -25")));
    assert!(!result.new_entries.iter().any(|e| e.contains("'opRate' changed by 15")));
}

/// Re-running against a ledger holding every reported sentence sends nothing
#[test]
fn test_nightly_fixture_rerun_is_silent() {
    let labels = RenderLabels::default();
    let selected = select(fixture_records(), SelectionMode::Threshold(11.0));
    let first = reconcile(&selected, &NotificationLedger::default(), &labels);

    let persisted = format!("{}\n\n", first.new_entries.join("\n\n"));
    let ledger = NotificationLedger::parse(&persisted).unwrap();
    assert_eq!(ledger.len(), 7);

    let second = reconcile(&selected, &ledger, &labels);
    assert!(second.is_empty());
    assert_eq!(second.already_notified, 7);

    let composer = DigestComposer::new(default_template("hunter")).unwrap();
    assert!(composer.compose(&second.new_text()).is_none());
}

/// Legacy mode reports every regression, including the small ones
#[test]
fn test_nightly_fixture_all_regressions() {
    let selected = select(fixture_records(), SelectionMode::AllRegressions);
    assert_eq!(selected.len(), 10);
    assert!(selected
        .iter()
        .all(|record| record.class() == ChangeClass::Regression));
}

/// Digest body lists the fixture's regressions between greeting and sign-off
#[test]
fn test_nightly_fixture_digest_body() {
    let selected = select(fixture_records(), SelectionMode::Threshold(11.0));
    let result = reconcile(&selected, &NotificationLedger::default(), &RenderLabels::default());
    let composer = DigestComposer::new(default_template("hunter")).unwrap();
    let body = composer.compose(&result.new_text()).unwrap();

    assert!(body.starts_with("Hello,\n\nPlease find the performance regressions detected by hunter"));
    assert!(body.ends_with("Best regards,\n\nThe performance team"));
    for entry in &result.new_entries {
        assert!(body.contains(entry.as_str()));
    }
}

/// A detector run that lists the same change twice reports neither copy
#[test]
fn test_duplicate_detector_emission_is_suppressed() {
    let batch = RawDetectorBatch::from_json_line(
        r#"{"t": [
            {"time": "2022-01-01 23:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]},
            {"time": "2022-01-01 23:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]}]}"#,
    )
    .unwrap();
    let summary = summarize(&batch, &unresolved_sources());
    let selected = select(summary.records, SelectionMode::Threshold(11.0));
    let result = reconcile(&selected, &NotificationLedger::default(), &RenderLabels::default());

    assert!(result.is_empty());
    assert_eq!(result.duplicate_keys.len(), 1);
}

/// Runs at different times of one day are separate changes
#[test]
fn test_same_day_runs_are_reported_separately() {
    let batch = RawDetectorBatch::from_json_line(
        r#"{"t": [
            {"time": "2022-01-01 11:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]},
            {"time": "2022-01-01 23:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]}]}"#,
    )
    .unwrap();
    let summary = summarize(&batch, &unresolved_sources());
    let labels = RenderLabels::default();
    let result = reconcile(&summary.records, &NotificationLedger::default(), &labels);

    assert_eq!(result.new_entries.len(), 2);
    assert!(result.duplicate_keys.is_empty());
    assert!(result.new_entries[0].contains("'2022-01-01 11:00:00'"));
    assert!(result.new_entries[1].contains("'2022-01-01 23:00:00'"));

    // The morning entry alone does not hide the evening run
    let morning_only = NotificationLedger::parse(&result.new_entries[0]).unwrap();
    let rerun = reconcile(&summary.records, &morning_only, &labels);
    assert_eq!(rerun.new_entries, vec![result.new_entries[1].clone()]);
}

/// A test type that would split a ledger line is rejected, and what remains
/// stays silent after the ledger is written and read back
#[test]
fn test_saved_ledger_suppresses_rerun_with_multiline_test_type() {
    let batch = RawDetectorBatch::from_json_line(
        r#"{
            "lwt\nfixed": [{"time": "2022-01-01 23:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]}],
            "lwt-fixed": [{"time": "2022-01-01 23:00:00", "changes": [
                {"metric": "p99", "forward_change_percent": "30"}]}]
        }"#,
    )
    .unwrap();
    let labels = RenderLabels::default();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("regressions_sent.log");

    let summary = summarize(&batch, &unresolved_sources());
    assert_eq!(summary.rejected.len(), 1);
    assert!(matches!(
        summary.rejected[0].error,
        DigestError::InvalidTestType(_)
    ));

    let ledger = NotificationLedger::load_or_create(&path).unwrap();
    let first = reconcile(&summary.records, &ledger, &labels);
    assert_eq!(first.new_entries.len(), 1);
    NotificationLedger::append_to_file(&path, &first.new_entries).unwrap();

    let reloaded = NotificationLedger::load_or_create(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.entries()[0].key.is_some());

    let again = summarize(&batch, &unresolved_sources());
    assert!(reconcile(&again.records, &reloaded, &labels).is_empty());
}

fn metric_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(
        MetricKind::ALL
            .iter()
            .map(|kind| kind.short_name())
            .collect::<Vec<_>>(),
    )
}

fn record_strategy() -> impl Strategy<Value = ChangeRecord> {
    (
        prop::sample::select(vec!["lwt-fixed-100-partitions", "lwt-rated-1000-partitions"]),
        1u32..28,
        metric_strategy(),
        -9999i32..9999,
    )
        .prop_map(|(test_type, day, metric, centi)| {
            ChangeRecord::new(
                test_type,
                RunTimestamp::parse(&format!("2023-02-{day:02} 23:00:00")).unwrap(),
                metric,
                &format!("{:.2}", centi as f64 / 100.0),
                crate::provenance::Provenance::default(),
            )
            .unwrap()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_reconcile_output_ignores_input_order(
        (original, shuffled) in prop::collection::vec(record_strategy(), 0..40)
            .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
    ) {
        let labels = RenderLabels::default();
        let ledger = NotificationLedger::default();
        let a = reconcile(&original, &ledger, &labels);
        let b = reconcile(&shuffled, &ledger, &labels);
        prop_assert_eq!(a.new_text(), b.new_text());
    }

    #[test]
    fn prop_second_reconcile_is_empty(records in prop::collection::vec(record_strategy(), 0..40)) {
        let labels = RenderLabels::default();
        let first = reconcile(&records, &NotificationLedger::default(), &labels);
        let second = reconcile(&records, &first.updated, &labels);
        prop_assert!(second.is_empty());
        prop_assert_eq!(second.updated.len(), first.updated.len());
    }

    #[test]
    fn prop_persisted_ledger_suppresses_rerun(records in prop::collection::vec(record_strategy(), 0..40)) {
        let labels = RenderLabels::default();
        let first = reconcile(&records, &NotificationLedger::default(), &labels);
        let persisted = NotificationLedger::parse(&first.new_text()).unwrap();
        prop_assert!(reconcile(&records, &persisted, &labels).is_empty());
    }
}
