use anyhow::{Context, Result};
use clap::Parser;
use perfdigest::cli::{Cli, Command};
use perfdigest::config::PipelineConfig;
use perfdigest::ingest::{self, parse_date_dir};
use perfdigest::pipeline::{DigestOutcome, DigestPipeline};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` overrides the info default
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_file(&cli.config)?;

    if let Command::Digest {
        all_changes,
        threshold,
        ..
    } = &cli.command
    {
        if *all_changes {
            config.digest.all_changes = true;
        }
        if let Some(threshold) = threshold {
            config.digest.all_changes = false;
            config.digest.threshold_percent = *threshold;
        }
    }

    config
        .validate()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    Ok(config)
}

fn run_digest(config: PipelineConfig, dry_run: bool) -> Result<()> {
    let report = DigestPipeline::from_config(config, dry_run).run()?;

    match &report.outcome {
        DigestOutcome::NoNewChanges => tracing::info!("No digest sent"),
        DigestOutcome::DryRun { .. } => tracing::info!("Dry run: digest printed, ledger unchanged"),
        DigestOutcome::Sent { recipient, .. } => {
            tracing::info!("Digest with {} changes sent to {}", report.new_entries, recipient)
        }
    }
    tracing::info!(
        "{} files, {} changes, {} selected, {} already notified, {} duplicates dropped",
        report.files_read,
        report.records,
        report.selected,
        report.already_notified,
        report.duplicates_dropped
    );

    if report.has_rejections() {
        for rejected in &report.rejected {
            eprintln!(
                "rejected: {} '{}' {}: {}",
                rejected.test_type, rejected.time, rejected.metric, rejected.error
            );
        }
        anyhow::bail!("{} detector changes were rejected", report.rejected.len());
    }
    Ok(())
}

fn run_backfill(config: PipelineConfig) -> Result<()> {
    let sources = config.provenance_sources();
    let report = ingest::run_backfill(&config, &sources)?;
    tracing::info!(
        "{} run dates: {} CSV files rebuilt, {} missing reports",
        report.dates.len(),
        report.written.len(),
        report.skipped.len()
    );

    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} reports could not be ingested: {}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(date, test_type, _)| format!("{test_type} on {date}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn run_ingest(config: PipelineConfig, date: Option<String>) -> Result<()> {
    let date = match date {
        Some(text) => Some(
            parse_date_dir(&text)
                .ok_or_else(|| anyhow::anyhow!("Invalid --date '{}' (expected YYYY_MM_DD)", text))?,
        ),
        None => None,
    };

    let sources = config.provenance_sources();
    let report = ingest::run_ingest(&config, &sources, date)?;
    tracing::info!(
        "{}: {} rows appended, {} already present, {} test types without results",
        report.date,
        report.appended.len(),
        report.already_present.len(),
        report.skipped.len()
    );

    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} test types could not be ingested: {}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(test_type, _)| test_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let config = load_config(&cli)?;

    match cli.command {
        Command::Digest { dry_run, .. } => run_digest(config, dry_run),
        Command::Ingest { all: true, .. } => run_backfill(config),
        Command::Ingest { date, .. } => run_ingest(config, date),
    }
}
