// Notification ledger and reconciliation
//
// The ledger is a flat text file of every change sentence already mailed, one
// per line with a blank line between entries. It is read fully at the start of
// a run and appended at most once at the end. Entries are parsed back into
// ChangeKeys; an entry that does not parse still suppresses an identical
// sentence.

use crate::digest::error::{DigestError, Result};
use crate::digest::record::{ChangeKey, ChangeRecord, RenderLabels, RunTimestamp};
use crate::metric::MetricName;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const ENTRY_PATTERN: &str = r"^For the test '(?P<test>.*)' on date and time '(?P<time>[^']*)' that ran on .*: The metric '(?P<metric>[^']*)' changed by (?P<percent>[-+0-9.eE]+)%\.?$";

/// A previously-notified change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub text: String,
    pub key: Option<ChangeKey>,
}

/// Set of changes that have already been mailed
#[derive(Debug, Clone, Default)]
pub struct NotificationLedger {
    entries: Vec<LedgerEntry>,
    texts: HashSet<String>,
    keys: HashSet<ChangeKey>,
}

impl NotificationLedger {
    /// Parse ledger content; blank lines and surrounding whitespace are ignored
    pub fn parse(content: &str) -> Result<Self> {
        let pattern = Regex::new(ENTRY_PATTERN)?;
        let mut ledger = Self::default();

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let key = parse_key(&pattern, line);
            if key.is_none() {
                tracing::debug!("Ledger entry matched by text only: {}", line);
            }
            ledger.push(LedgerEntry {
                text: line.to_string(),
                key,
            });
        }

        Ok(ledger)
    }

    /// Load the ledger at `path`, creating an empty file on first run
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Creating notification ledger at {}", path.display());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| io_error(path, source))?;
            }
            fs::write(path, "").map_err(|source| io_error(path, source))?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let ledger = Self::parse(&content)?;
        tracing::info!("Loaded {} ledger entries from {}", ledger.len(), path.display());
        Ok(ledger)
    }

    /// Append `entries` to the ledger file, each followed by a blank line
    pub fn append_to_file<P: AsRef<Path>>(path: P, entries: &[String]) -> Result<()> {
        let path = path.as_ref();
        if entries.is_empty() {
            return Ok(());
        }

        let mut block = String::new();
        for entry in entries {
            block.push_str(entry);
            block.push_str("\n\n");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| io_error(path, source))?;
        file.write_all(block.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|source| io_error(path, source))
    }

    fn push(&mut self, entry: LedgerEntry) {
        self.texts.insert(entry.text.clone());
        if let Some(key) = &entry.key {
            self.keys.insert(key.clone());
        }
        self.entries.push(entry);
    }

    /// True if the change was already notified, by identity or by exact text
    pub fn contains(&self, key: &ChangeKey, text: &str) -> bool {
        self.keys.contains(key) || self.texts.contains(text)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_key(pattern: &Regex, line: &str) -> Option<ChangeKey> {
    let caps = pattern.captures(line)?;
    let run_at = RunTimestamp::parse(&caps["time"]).ok()?.instant();
    let metric = MetricName::parse(&caps["metric"])?;
    let percent = caps["percent"].parse::<f64>().ok()?;
    Some(ChangeKey::new(&caps["test"], run_at, metric, percent))
}

fn io_error(path: &Path, source: std::io::Error) -> DigestError {
    DigestError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Result of reconciling a batch against the ledger
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Rendered sentences not yet notified, ordered by ChangeKey
    pub new_entries: Vec<String>,
    /// Keys reported more than once in the batch, dropped entirely
    pub duplicate_keys: Vec<ChangeKey>,
    /// Number of eligible candidates already present in the ledger
    pub already_notified: usize,
    /// Ledger state after appending `new_entries`
    pub updated: NotificationLedger,
}

impl Reconciliation {
    /// New sentences as one block, entries separated by blank lines
    pub fn new_text(&self) -> String {
        self.new_entries.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.new_entries.is_empty()
    }
}

/// Compute which candidates are new relative to `ledger`
///
/// A change reported two or more times in the same batch is treated as a
/// duplicate detector emission and dropped, not collapsed to one. The
/// remaining candidates are new unless their key or exact sentence is already
/// in the ledger. Output order depends only on the keys, never on input order.
pub fn reconcile(
    candidates: &[ChangeRecord],
    ledger: &NotificationLedger,
    labels: &RenderLabels,
) -> Reconciliation {
    let mut occurrences: HashMap<ChangeKey, usize> = HashMap::new();
    for record in candidates {
        *occurrences.entry(record.key()).or_insert(0) += 1;
    }

    let mut duplicate_keys: Vec<ChangeKey> = occurrences
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(key, _)| key.clone())
        .collect();
    duplicate_keys.sort();
    for key in &duplicate_keys {
        tracing::warn!(
            "Dropping change reported {} times in one batch: {} {} {} {}",
            occurrences[key],
            key.test_type,
            key.run_at,
            key.metric,
            key.percent_centi as f64 / 100.0
        );
    }

    let mut fresh: BTreeMap<ChangeKey, String> = BTreeMap::new();
    let mut already_notified = 0;
    for record in candidates {
        let key = record.key();
        if occurrences[&key] > 1 {
            continue;
        }

        let text = record.render(labels);
        if ledger.contains(&key, &text) {
            already_notified += 1;
            continue;
        }
        fresh.insert(key, text);
    }

    let mut updated = ledger.clone();
    for (key, text) in &fresh {
        updated.push(LedgerEntry {
            text: text.clone(),
            key: Some(key.clone()),
        });
    }

    Reconciliation {
        new_entries: fresh.into_values().collect(),
        duplicate_keys,
        already_notified,
        updated,
    }
}
