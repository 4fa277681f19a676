//! Digest run orchestration
//!
//! One nightly run: read the detector output, summarize, select, reconcile
//! against the ledger, compose, persist, send. The ledger is appended before
//! the transport is invoked so a failed send is never re-notified on retry.

use crate::config::PipelineConfig;
use crate::credentials::{CredentialSource, MailCredentials};
use crate::detector::RawDetectorBatch;
use crate::digest::{reconcile, select, summarize, NotificationLedger, RejectedChange};
use crate::notify::{self, DigestTransport, SmtpMailer, StdoutTransport};
use crate::provenance::ProvenanceSources;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How a digest run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestOutcome {
    /// Nothing new to report; the ledger was left untouched
    NoNewChanges,
    /// The digest was printed, not mailed
    DryRun { subject: String, body: String },
    /// The digest was mailed
    Sent { subject: String, recipient: String },
}

/// Summary of a digest run
#[derive(Debug)]
pub struct RunReport {
    pub files_read: usize,
    pub records: usize,
    pub selected: usize,
    pub new_entries: usize,
    pub already_notified: usize,
    pub duplicates_dropped: usize,
    /// Detector changes that could not be classified or parsed
    pub rejected: Vec<RejectedChange>,
    pub outcome: DigestOutcome,
}

impl RunReport {
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Placeholder sender for dry runs without a configured account
const DRY_RUN_SENDER: &str = "perfdigest@localhost";

/// Orchestrates a digest run with injected collaborators
pub struct DigestPipeline {
    config: PipelineConfig,
    sources: ProvenanceSources,
    credentials: Box<dyn CredentialSource>,
    transport: Box<dyn DigestTransport>,
    dry_run: bool,
}

impl DigestPipeline {
    pub fn new(
        config: PipelineConfig,
        sources: ProvenanceSources,
        credentials: Box<dyn CredentialSource>,
        transport: Box<dyn DigestTransport>,
    ) -> Self {
        Self {
            config,
            sources,
            credentials,
            transport,
            dry_run: false,
        }
    }

    /// Build the production pipeline: SMTP for real runs, stdout for dry runs
    pub fn from_config(config: PipelineConfig, dry_run: bool) -> Self {
        let sources = config.provenance_sources();
        let credentials = config.credential_source();
        let transport: Box<dyn DigestTransport> = if dry_run {
            Box::new(StdoutTransport)
        } else {
            Box::new(SmtpMailer::new(
                config.mail.smtp_host.as_str(),
                config.mail.smtp_port,
                Duration::from_secs(config.mail.timeout_secs),
            ))
        };

        Self::new(config, sources, credentials, transport).with_dry_run(dry_run)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Merge the most recent detector run from every results file
    ///
    /// A results file that does not exist is skipped with a warning.
    pub fn load_batch(&self) -> Result<(RawDetectorBatch, usize)> {
        let mut batch = RawDetectorBatch::default();
        let mut files_read = 0;

        for path in self.config.results_paths() {
            if !path.exists() {
                tracing::warn!("Detector results file not found: {}", path.display());
                continue;
            }

            let file_batch = RawDetectorBatch::from_file(&path)
                .with_context(|| format!("Failed to load detector results {}", path.display()))?;
            tracing::debug!(
                "{}: {} changes",
                path.display(),
                file_batch.change_count()
            );
            batch.merge(file_batch);
            files_read += 1;
        }

        Ok((batch, files_read))
    }

    fn load_ledger(&self) -> Result<NotificationLedger> {
        let path = &self.config.digest.ledger_path;
        if self.dry_run {
            if !path.exists() {
                return Ok(NotificationLedger::default());
            }
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read ledger {}", path.display()))?;
            return Ok(NotificationLedger::parse(&content)?);
        }

        NotificationLedger::load_or_create(path)
            .with_context(|| format!("Failed to load ledger {}", path.display()))
    }

    fn write_report(&self, path: &Path, body: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn sender_credentials(&self) -> Result<MailCredentials> {
        match self.credentials.credentials() {
            Ok(creds) => Ok(creds),
            Err(e) if self.dry_run => {
                tracing::debug!("No mail credentials for dry run: {}", e);
                Ok(MailCredentials {
                    username: DRY_RUN_SENDER.to_string(),
                    password: String::new(),
                })
            }
            Err(e) => Err(e).context("Failed to obtain mail credentials"),
        }
    }

    /// Execute one digest run
    pub fn run(&self) -> Result<RunReport> {
        let recipient = self.config.mail.recipient.as_str();
        if !self.dry_run && recipient.is_empty() {
            anyhow::bail!("mail.recipient is not configured");
        }

        let mode = self.config.selection_mode();
        let composer = self.config.composer()?;
        let labels = self.config.render_labels();

        let (batch, files_read) = self.load_batch()?;
        let summary = summarize(&batch, &self.sources);

        let records = summary.records.len();
        let selected = select(summary.records, mode);
        tracing::info!(
            "{} of {} changes selected ({:?})",
            selected.len(),
            records,
            mode
        );

        let ledger = self.load_ledger()?;
        let reconciliation = reconcile(&selected, &ledger, &labels);

        let mut report = RunReport {
            files_read,
            records,
            selected: selected.len(),
            new_entries: reconciliation.new_entries.len(),
            already_notified: reconciliation.already_notified,
            duplicates_dropped: reconciliation.duplicate_keys.len(),
            rejected: summary.rejected,
            outcome: DigestOutcome::NoNewChanges,
        };

        let Some(body) = composer.compose(&reconciliation.new_text()) else {
            tracing::info!("No new performance regressions to report");
            return Ok(report);
        };
        let subject = notify::subject_line(mode, &self.config.digest.detector_name);

        let credentials = self.sender_credentials()?;
        let to = if recipient.is_empty() { DRY_RUN_SENDER } else { recipient };
        if !self.dry_run {
            notify::check_addresses(&credentials.username, to)
                .context("Digest cannot be addressed; ledger left unchanged")?;

            let ledger_path = &self.config.digest.ledger_path;
            NotificationLedger::append_to_file(ledger_path, &reconciliation.new_entries)
                .with_context(|| format!("Failed to update ledger {}", ledger_path.display()))?;
            tracing::info!(
                "Recorded {} new entries in {}",
                reconciliation.new_entries.len(),
                ledger_path.display()
            );

            if let Some(path) = &self.config.digest.report_path {
                self.write_report(path, &body)?;
            }
        }

        notify::send(self.transport.as_ref(), &subject, &body, to, &credentials)
            .context("Failed to send digest (ledger already updated)")?;

        report.outcome = if self.dry_run {
            DigestOutcome::DryRun { subject, body }
        } else {
            DigestOutcome::Sent {
                subject,
                recipient: recipient.to_string(),
            }
        };
        Ok(report)
    }
}
