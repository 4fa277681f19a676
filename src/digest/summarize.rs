// Flattening detector output into change records
//
// Provenance is resolved once per run date within a pass. Repeated lookups for
// the same date could straddle a push and attribute one run to two commits.

use crate::detector::RawDetectorBatch;
use crate::digest::error::DigestError;
use crate::digest::record::{ChangeRecord, RunTimestamp};
use crate::provenance::{Provenance, ProvenanceSources};
use chrono::NaiveDate;
use std::collections::HashMap;

/// A detector change that could not become a record
#[derive(Debug)]
pub struct RejectedChange {
    pub test_type: String,
    pub time: String,
    pub metric: String,
    pub error: DigestError,
}

/// Output of one summarization pass
#[derive(Debug, Default)]
pub struct Summary {
    /// Records in detector order (test type, then timestamp, then change)
    pub records: Vec<ChangeRecord>,
    pub rejected: Vec<RejectedChange>,
    /// Distinct dates for which provenance was resolved
    pub dates_resolved: usize,
}

/// Flatten a detector batch into change records
pub fn summarize(batch: &RawDetectorBatch, sources: &ProvenanceSources) -> Summary {
    let mut summary = Summary::default();
    let mut provenance_by_date: HashMap<NaiveDate, Provenance> = HashMap::new();

    if batch.is_empty() {
        tracing::info!("No significant changes were detected for any metrics");
        return summary;
    }

    for (test_type, entries) in &batch.tests {
        for entry in entries {
            if entry.changes.is_empty() {
                tracing::debug!("{}: no changes at '{}'", test_type, entry.time);
                continue;
            }

            let timestamp = match RunTimestamp::parse(&entry.time) {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    tracing::error!("{}: {}", test_type, e);
                    for change in &entry.changes {
                        summary.rejected.push(RejectedChange {
                            test_type: test_type.clone(),
                            time: entry.time.clone(),
                            metric: change.metric.clone(),
                            error: DigestError::MalformedTimestamp(entry.time.clone()),
                        });
                    }
                    continue;
                }
            };

            let provenance = provenance_by_date
                .entry(timestamp.date())
                .or_insert_with(|| sources.resolve(timestamp.date()))
                .clone();

            for change in &entry.changes {
                match ChangeRecord::new(
                    test_type.clone(),
                    timestamp.clone(),
                    &change.metric,
                    &change.forward_change_percent,
                    provenance.clone(),
                ) {
                    Ok(record) => summary.records.push(record),
                    Err(error) => {
                        tracing::error!(
                            "{} at '{}': rejected change for '{}': {}",
                            test_type,
                            entry.time,
                            change.metric,
                            error
                        );
                        summary.rejected.push(RejectedChange {
                            test_type: test_type.clone(),
                            time: entry.time.clone(),
                            metric: change.metric.clone(),
                            error,
                        });
                    }
                }
            }
        }
    }

    summary.dates_resolved = provenance_by_date.len();
    summary
}
