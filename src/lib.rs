//! perfdigest - nightly benchmark regression digest
//!
//! This library turns change-point detector output for nightly load tests into
//! a deduplicated email digest of significant performance regressions, and
//! maintains the per-test-type CSV files the detector reads.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod detector;
pub mod digest;
pub mod ingest;
pub mod metric;
pub mod notify;
pub mod pipeline;
pub mod provenance;
