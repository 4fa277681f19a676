#![no_main]

use libfuzzer_sys::fuzz_target;
use perfdigest::detector::RawDetectorBatch;
use perfdigest::digest::{summarize, RenderLabels};
use perfdigest::provenance::{CommitLookup, LookupError, ProvenanceSources};

struct Unresolved;

impl CommitLookup for Unresolved {
    fn name(&self) -> &str {
        "unresolved"
    }

    fn lookup(&self, date: chrono::NaiveDate) -> Result<String, LookupError> {
        Err(LookupError::NotFound(date.to_string()))
    }
}

fuzz_target!(|data: &[u8]| {
    // Parsing and summarizing arbitrary detector output must never panic, and
    // every record must render onto a single ledger line
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(batch) = RawDetectorBatch::from_jsonl_str(input, "fuzz") {
            let sources = ProvenanceSources::new(Box::new(Unresolved), Box::new(Unresolved));
            let summary = summarize(&batch, &sources);
            let labels = RenderLabels::default();
            for record in &summary.records {
                assert!(!record.render(&labels).contains('\n'));
            }
        }
    }
});
