// Directional classification and significance filtering
//
// Throughput metrics regress when they fall; latency and spread metrics
// regress when they rise. The direction comes from the metric table, never
// from the spelling of the name.

use crate::digest::error::{DigestError, Result};
use crate::digest::record::ChangeRecord;
use crate::metric::{Direction, MetricKind, MetricName};

/// Whether a change moved a metric in the good or the bad direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Improvement,
    Regression,
}

/// Classify a change of `percent_change` percent in `metric_name`
///
/// # Example
/// ```
/// use perfdigest::digest::{classify, ChangeClass};
///
/// assert_eq!(classify("opRate", -15.0).unwrap(), ChangeClass::Regression);
/// assert_eq!(classify("p99", -15.0).unwrap(), ChangeClass::Improvement);
/// assert!(classify("bogus", 1.0).is_err());
/// ```
pub fn classify(metric_name: &str, percent_change: f64) -> Result<ChangeClass> {
    let metric = MetricName::parse(metric_name)
        .ok_or_else(|| DigestError::UnknownMetricKind(metric_name.to_string()))?;
    Ok(classify_kind(metric.kind, percent_change))
}

/// Classify a change for an already-validated metric
pub fn classify_kind(kind: MetricKind, percent_change: f64) -> ChangeClass {
    let worse = match kind.direction() {
        Direction::HigherIsBetter => percent_change < 0.0,
        Direction::LowerIsBetter => percent_change > 0.0,
    };

    if worse {
        ChangeClass::Regression
    } else {
        ChangeClass::Improvement
    }
}

impl ChangeRecord {
    pub fn class(&self) -> ChangeClass {
        classify_kind(self.metric.kind, self.forward_change_percent)
    }
}

/// A record is significant iff it regressed by strictly more than `threshold` percent
pub fn is_significant(record: &ChangeRecord, threshold: f64) -> bool {
    record.class() == ChangeClass::Regression && record.forward_change_percent.abs() > threshold
}

/// Which regressions make it into the digest
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionMode {
    /// Regressions whose magnitude exceeds the threshold (default)
    Threshold(f64),
    /// Every regression regardless of magnitude (legacy mode)
    AllRegressions,
}

impl SelectionMode {
    pub fn selects(&self, record: &ChangeRecord) -> bool {
        match self {
            SelectionMode::Threshold(threshold) => is_significant(record, *threshold),
            SelectionMode::AllRegressions => record.class() == ChangeClass::Regression,
        }
    }
}

/// Keep only the records the digest should report
pub fn select(records: Vec<ChangeRecord>, mode: SelectionMode) -> Vec<ChangeRecord> {
    records
        .into_iter()
        .filter(|record| {
            let keep = mode.selects(record);
            tracing::debug!(
                "{} {} {}% -> {:?}, kept={}",
                record.test_type,
                record.metric,
                record.percent_text,
                record.class(),
                keep
            );
            keep
        })
        .collect()
}
