//! CLI argument parsing for perfdigest

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "perfdigest")]
#[command(version)]
#[command(about = "Nightly benchmark regression digest and results ingestion", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "PATH", default_value = "perfdigest.toml")]
    pub config: PathBuf,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Mail new performance regressions found by the change-point detector
    Digest {
        /// Print the digest instead of mailing it; the ledger is left untouched
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Report every regression regardless of magnitude
        #[arg(long = "all-changes")]
        all_changes: bool,

        /// Regression magnitude threshold in percent (strictly exceeded)
        #[arg(long, value_name = "PCT", conflicts_with = "all_changes")]
        threshold: Option<f64>,
    },

    /// Append the latest nightly results to the detector's CSV inputs
    Ingest {
        /// Run date directory to ingest instead of the latest one
        #[arg(long, value_name = "YYYY_MM_DD")]
        date: Option<String>,

        /// Rebuild every CSV from all run date directories
        #[arg(long, conflicts_with = "date")]
        all: bool,
    },
}
