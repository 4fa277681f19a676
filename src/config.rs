//! Pipeline configuration
//!
//! Every path, label and threshold the pipeline needs lives here and is passed
//! down explicitly. Loaded from TOML; every field has a default so an empty
//! file is a valid (if not very useful) configuration.
//!
//! ```toml
//! nightly_results_dir = "/srv/nightly_results"
//!
//! [digest]
//! threshold_percent = 11.0
//! results_dir = "/srv/hunter"
//! ledger_path = "/srv/hunter/regressions_sent.log"
//!
//! [mail]
//! recipient = "perf-alerts@example.org"
//! ```

use crate::credentials::{CredentialSource, EnvCredentials, SecretFileCredentials};
use crate::digest::{default_template, DigestComposer, RenderLabels, SelectionMode};
use crate::provenance::{
    CommitLookup, FallbackLookup, GitHistoryLookup, HarnessShaLogLookup, PrimaryLogLookup,
    ProvenanceSources,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The six lightweight-transaction test variants run every night
pub const DEFAULT_TEST_TYPES: [&str; 6] = [
    "lwt-fixed-100-partitions",
    "lwt-fixed-1000-partitions",
    "lwt-fixed-10000-partitions",
    "lwt-rated-100-partitions",
    "lwt-rated-1000-partitions",
    "lwt-rated-10000-partitions",
];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the nightly results tree (`<root>/<YYYY_MM_DD>/<test_type>/...`)
    pub nightly_results_dir: PathBuf,
    pub digest: DigestSection,
    pub provenance: ProvenanceSection,
    pub mail: MailSection,
    pub credentials: CredentialsSection,
    pub ingest: IngestSection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nightly_results_dir: PathBuf::from("nightly_results"),
            digest: DigestSection::default(),
            provenance: ProvenanceSection::default(),
            mail: MailSection::default(),
            credentials: CredentialsSection::default(),
            ingest: IngestSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DigestSection {
    /// Magnitude a regression must strictly exceed, in percent
    pub threshold_percent: f64,
    /// Report every regression regardless of magnitude
    pub all_changes: bool,
    pub detector_name: String,
    /// Directory holding the detector's per-test-type result files
    pub results_dir: PathBuf,
    pub results_files: Vec<String>,
    pub ledger_path: PathBuf,
    /// Optional copy of the composed email body
    pub report_path: Option<PathBuf>,
    /// Email template; `None` uses the built-in greeting and sign-off
    pub template: Option<String>,
    pub primary_label: String,
    pub harness_label: String,
}

impl Default for DigestSection {
    fn default() -> Self {
        Self {
            threshold_percent: 11.0,
            all_changes: false,
            detector_name: "hunter".to_string(),
            results_dir: PathBuf::from("."),
            results_files: [
                "fixed_100",
                "fixed_1000",
                "fixed_10000",
                "rated_100",
                "rated_1000",
                "rated_10000",
            ]
            .iter()
            .map(|variant| format!("hunter_result_{variant}.json"))
            .collect(),
            ledger_path: PathBuf::from("regressions_sent.log"),
            report_path: None,
            template: None,
            primary_label: "cassandra".to_string(),
            harness_label: "fallout-tests".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvenanceSection {
    /// Directory of `<YYYY_MM_DD>/<harness_sha_file>` logs
    pub harness_sha_dir: PathBuf,
    pub harness_sha_file: String,
    /// Git checkout consulted when the primary log has no hash
    pub primary_repo: Option<PathBuf>,
    /// Git checkout consulted when the harness log has no hash
    pub harness_repo: Option<PathBuf>,
    pub git_timeout_secs: u64,
    pub short_hash_len: usize,
    pub primary_log_marker: String,
    pub primary_log_file: PathBuf,
}

impl Default for ProvenanceSection {
    fn default() -> Self {
        Self {
            harness_sha_dir: PathBuf::from("fallout-tests_sha"),
            harness_sha_file: "fallout-tests_git_sha.log".to_string(),
            primary_repo: None,
            harness_repo: None,
            git_timeout_secs: 30,
            short_hash_len: 7,
            primary_log_marker: "Git SHA: ".to_string(),
            primary_log_file: PathBuf::from("performance-tester-dc1-default-sts-0/logs.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MailSection {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub recipient: String,
    pub timeout_secs: u64,
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            recipient: String::new(),
            timeout_secs: 60,
        }
    }
}

/// Where the mail account credentials come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    #[default]
    Env,
    SecretFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CredentialsSection {
    pub source: CredentialKind,
    /// Required when `source = "secret-file"`
    pub secret_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSection {
    /// Directory of the detector's CSV inputs
    pub csv_dir: PathBuf,
    pub test_types: Vec<String>,
    pub run_time_of_day: String,
    pub utc_offset: String,
    pub csv_prefix: String,
    pub csv_suffix: String,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            csv_dir: PathBuf::from("."),
            test_types: DEFAULT_TEST_TYPES.iter().map(|t| t.to_string()).collect(),
            run_time_of_day: "23:00:00".to_string(),
            utc_offset: "+0000".to_string(),
            csv_prefix: "hunter-".to_string(),
            csv_suffix: "-w-two-git-shas".to_string(),
        }
    }
}

impl IngestSection {
    /// CSV file receiving rows for `test_type`
    pub fn csv_path(&self, test_type: &str) -> PathBuf {
        self.csv_dir.join(format!(
            "{}{}{}.csv",
            self.csv_prefix, test_type, self.csv_suffix
        ))
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let threshold = self.digest.threshold_percent;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(format!(
                "threshold_percent must be a non-negative number, got {threshold}"
            ));
        }

        if self.digest.results_files.is_empty() {
            return Err("results_files must name at least one detector output".to_string());
        }

        if self.digest.detector_name.trim().is_empty() {
            return Err("detector_name must not be empty".to_string());
        }

        if let Some(template) = &self.digest.template {
            DigestComposer::new(template.as_str()).map_err(|e| e.to_string())?;
        }

        if self.provenance.short_hash_len == 0 {
            return Err("short_hash_len must be at least 1".to_string());
        }

        if self.provenance.git_timeout_secs == 0 {
            return Err("git_timeout_secs must be at least 1".to_string());
        }

        if self.credentials.source == CredentialKind::SecretFile
            && self.credentials.secret_file.is_none()
        {
            return Err("credentials.secret_file is required for source = \"secret-file\"".to_string());
        }

        Ok(())
    }

    /// Selection rule for the digest
    pub fn selection_mode(&self) -> SelectionMode {
        if self.digest.all_changes {
            SelectionMode::AllRegressions
        } else {
            SelectionMode::Threshold(self.digest.threshold_percent)
        }
    }

    pub fn render_labels(&self) -> RenderLabels {
        RenderLabels {
            primary: self.digest.primary_label.clone(),
            harness: self.digest.harness_label.clone(),
        }
    }

    pub fn results_paths(&self) -> Vec<PathBuf> {
        self.digest
            .results_files
            .iter()
            .map(|name| self.digest.results_dir.join(name))
            .collect()
    }

    pub fn composer(&self) -> Result<DigestComposer> {
        let template = self
            .digest
            .template
            .clone()
            .unwrap_or_else(|| default_template(&self.digest.detector_name));
        Ok(DigestComposer::new(template)?)
    }

    /// Commit lookups: the run logs first, then git history when a checkout is configured
    pub fn provenance_sources(&self) -> ProvenanceSources {
        let prov = &self.provenance;
        let timeout = Duration::from_secs(prov.git_timeout_secs);

        let mut primary: Vec<Box<dyn CommitLookup>> = vec![Box::new(PrimaryLogLookup::new(
            &self.nightly_results_dir,
            &prov.primary_log_file,
            prov.primary_log_marker.as_str(),
        ))];
        if let Some(repo) = &prov.primary_repo {
            primary.push(Box::new(GitHistoryLookup::new(repo, timeout, prov.short_hash_len)));
        }

        let mut harness: Vec<Box<dyn CommitLookup>> = vec![Box::new(HarnessShaLogLookup::new(
            &prov.harness_sha_dir,
            prov.harness_sha_file.as_str(),
        ))];
        if let Some(repo) = &prov.harness_repo {
            harness.push(Box::new(GitHistoryLookup::new(repo, timeout, prov.short_hash_len)));
        }

        ProvenanceSources::new(
            Box::new(FallbackLookup::new(self.digest.primary_label.as_str(), primary)),
            Box::new(FallbackLookup::new(self.digest.harness_label.as_str(), harness)),
        )
    }

    pub fn credential_source(&self) -> Box<dyn CredentialSource> {
        match (&self.credentials.source, &self.credentials.secret_file) {
            (CredentialKind::SecretFile, Some(path)) => Box::new(SecretFileCredentials::new(path)),
            _ => Box::new(EnvCredentials),
        }
    }
}
