//! Commit provenance for benchmark runs
//!
//! A nightly run is attributed to two commits: the database under test
//! (primary) and the test harness. Each is resolved by date through a chain of
//! lookups: the run's own log files first, then the repository history.
//!
//! Lookups never invent a hash. "Not found" is an ordinary outcome; callers
//! decide whether to degrade to an empty string.

use chrono::NaiveDate;
use crossbeam::channel::{bounded, RecvTimeoutError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from a single commit lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No commit recorded for {0}")]
    NotFound(String),

    #[error("Commit lookup unavailable: {0}")]
    Unavailable(String),

    #[error("Commit lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Directory-name form of a run date (`2023_04_16`)
pub fn date_dir_name(date: NaiveDate) -> String {
    date.format("%Y_%m_%d").to_string()
}

/// Resolves a short commit hash for the code in effect on a given date
pub trait CommitLookup {
    /// Short name used in log messages
    fn name(&self) -> &str;

    fn lookup(&self, date: NaiveDate) -> Result<String, LookupError>;
}

/// Commit pair recorded for a benchmark run; empty strings when unresolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Provenance {
    pub primary_commit: String,
    pub harness_commit: String,
}

impl Provenance {
    pub fn new(primary_commit: impl Into<String>, harness_commit: impl Into<String>) -> Self {
        Self {
            primary_commit: primary_commit.into(),
            harness_commit: harness_commit.into(),
        }
    }
}

/// The two lookups a run needs, one per tracked repository
pub struct ProvenanceSources {
    pub primary: Box<dyn CommitLookup>,
    pub harness: Box<dyn CommitLookup>,
}

impl ProvenanceSources {
    pub fn new(primary: Box<dyn CommitLookup>, harness: Box<dyn CommitLookup>) -> Self {
        Self { primary, harness }
    }

    /// Resolve both commits, degrading any failure to an empty hash
    pub fn resolve(&self, date: NaiveDate) -> Provenance {
        Provenance {
            primary_commit: resolve_or_empty(self.primary.as_ref(), date),
            harness_commit: resolve_or_empty(self.harness.as_ref(), date),
        }
    }
}

fn resolve_or_empty(lookup: &dyn CommitLookup, date: NaiveDate) -> String {
    match lookup.lookup(date) {
        Ok(hash) if hash.chars().any(char::is_control) => {
            tracing::warn!("{}: unusable commit {:?} for {}; using empty hash", lookup.name(), hash, date);
            String::new()
        }
        Ok(hash) => hash,
        Err(LookupError::NotFound(what)) => {
            tracing::warn!("{}: no commit for {} ({}); using empty hash", lookup.name(), date, what);
            String::new()
        }
        Err(e) => {
            tracing::warn!("{}: {}; using empty hash for {}", lookup.name(), e, date);
            String::new()
        }
    }
}

/// Reads the `Git SHA: <hash>` line the load tester prints into its logs
///
/// Several subtests write a log for the same date; some may fail before the
/// hash is printed, so the first non-empty hash wins.
#[derive(Debug, Clone)]
pub struct PrimaryLogLookup {
    nightly_results_dir: PathBuf,
    log_file: PathBuf,
    marker: String,
}

impl PrimaryLogLookup {
    pub fn new(
        nightly_results_dir: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            nightly_results_dir: nightly_results_dir.into(),
            log_file: log_file.into(),
            marker: marker.into(),
        }
    }

    fn hash_from_log(&self, content: &str) -> Option<String> {
        content
            .lines()
            .filter_map(|line| line.split_once(self.marker.as_str()))
            .map(|(_, rest)| rest.trim().to_string())
            .find(|hash| !hash.is_empty())
    }
}

impl CommitLookup for PrimaryLogLookup {
    fn name(&self) -> &str {
        "primary-log"
    }

    fn lookup(&self, date: NaiveDate) -> Result<String, LookupError> {
        let date_dir = self.nightly_results_dir.join(date_dir_name(date));
        if !date_dir.is_dir() {
            return Err(LookupError::NotFound(date_dir.display().to_string()));
        }

        let logs = find_files(&date_dir, &mut |path| path.ends_with(&self.log_file))
            .map_err(|e| LookupError::Unavailable(format!("{}: {}", date_dir.display(), e)))?;

        for log in &logs {
            let content = fs::read_to_string(log)
                .map_err(|e| LookupError::Unavailable(format!("{}: {}", log.display(), e)))?;
            if let Some(hash) = self.hash_from_log(&content) {
                return Ok(hash);
            }
        }

        Err(LookupError::NotFound(format!(
            "{} under {}",
            self.log_file.display(),
            date_dir.display()
        )))
    }
}

/// Reads `<dir>/<YYYY_MM_DD>/<file>`, whose first comma-separated field is the hash
#[derive(Debug, Clone)]
pub struct HarnessShaLogLookup {
    sha_dir: PathBuf,
    file_name: String,
}

impl HarnessShaLogLookup {
    pub fn new(sha_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            sha_dir: sha_dir.into(),
            file_name: file_name.into(),
        }
    }
}

impl CommitLookup for HarnessShaLogLookup {
    fn name(&self) -> &str {
        "harness-sha-log"
    }

    fn lookup(&self, date: NaiveDate) -> Result<String, LookupError> {
        let path = self
            .sha_dir
            .join(date_dir_name(date))
            .join(&self.file_name);
        if !path.is_file() {
            return Err(LookupError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| LookupError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let hash = content
            .lines()
            .next()
            .unwrap_or_default()
            .split(',')
            .next()
            .unwrap_or_default()
            .trim();
        if hash.is_empty() {
            return Err(LookupError::NotFound(path.display().to_string()));
        }

        Ok(hash.to_string())
    }
}

/// Newest commit reachable from HEAD that was committed before the end of `date` (UTC)
#[derive(Debug, Clone)]
pub struct GitHistoryLookup {
    repo: PathBuf,
    timeout: Duration,
    short_len: usize,
}

impl GitHistoryLookup {
    pub fn new(repo: impl Into<PathBuf>, timeout: Duration, short_len: usize) -> Self {
        Self {
            repo: repo.into(),
            timeout,
            short_len,
        }
    }
}

impl CommitLookup for GitHistoryLookup {
    fn name(&self) -> &str {
        "git-history"
    }

    fn lookup(&self, date: NaiveDate) -> Result<String, LookupError> {
        let cutoff = date
            .succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc().timestamp())
            .ok_or_else(|| LookupError::Unavailable(format!("date out of range: {date}")))?;

        // The walk runs on a worker so a wedged repository cannot stall the run.
        let (tx, rx) = bounded(1);
        let repo = self.repo.clone();
        let short_len = self.short_len;
        std::thread::Builder::new()
            .name("git-history-lookup".to_string())
            .spawn(move || {
                let _ = tx.send(newest_commit_before(&repo, cutoff, short_len));
            })
            .map_err(|e| LookupError::Unavailable(format!("failed to spawn lookup: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LookupError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(LookupError::Unavailable(
                "lookup worker exited without a result".to_string(),
            )),
        }
    }
}

fn newest_commit_before(repo_path: &Path, cutoff: i64, short_len: usize) -> Result<String, LookupError> {
    let repo = gix::open(repo_path).map_err(|err| {
        LookupError::Unavailable(format!("failed to open {}: {err}", repo_path.display()))
    })?;

    let head_id = repo
        .head_id()
        .map_err(|err| LookupError::Unavailable(format!("failed to resolve HEAD: {err}")))?
        .detach();
    let walk = repo
        .rev_walk([head_id])
        .sorting(gix::revision::walk::Sorting::ByCommitTime(
            gix::traverse::commit::simple::CommitTimeOrder::NewestFirst,
        ))
        .all()
        .map_err(|err| LookupError::Unavailable(format!("failed to start revision walk: {err}")))?;

    for entry in walk {
        let info = entry
            .map_err(|err| LookupError::Unavailable(format!("revision walk entry failed: {err}")))?;
        let commit = match repo.find_commit(info.id) {
            Ok(value) => value,
            Err(_) => continue,
        };
        let commit_time = commit.time().map(|time| time.seconds).unwrap_or(0);
        if commit_time < cutoff {
            return Ok(info.id.to_string().chars().take(short_len).collect());
        }
    }

    Err(LookupError::NotFound(format!(
        "no commit before {} in {}",
        cutoff,
        repo_path.display()
    )))
}

/// Tries each lookup in order and returns the first non-empty hash
pub struct FallbackLookup {
    name: String,
    chain: Vec<Box<dyn CommitLookup>>,
}

impl FallbackLookup {
    pub fn new(name: impl Into<String>, chain: Vec<Box<dyn CommitLookup>>) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }
}

impl CommitLookup for FallbackLookup {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, date: NaiveDate) -> Result<String, LookupError> {
        let mut last_error = LookupError::NotFound(format!("{}: no lookups configured", self.name));

        for lookup in &self.chain {
            match lookup.lookup(date) {
                Ok(hash) if !hash.is_empty() => return Ok(hash),
                Ok(_) => {
                    tracing::debug!("{}: empty hash for {}", lookup.name(), date);
                }
                Err(LookupError::NotFound(what)) => {
                    tracing::debug!("{}: not found for {} ({})", lookup.name(), date, what);
                    if matches!(last_error, LookupError::NotFound(_)) {
                        last_error = LookupError::NotFound(what);
                    }
                }
                Err(e) => {
                    tracing::debug!("{}: {} for {}", lookup.name(), e, date);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Depth-first search for files matching `predicate`
fn collect_files(
    dir: &Path,
    predicate: &mut dyn FnMut(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, predicate, out)?;
        } else if predicate(&path) {
            out.push(path);
        }
    }
    Ok(())
}

pub(crate) fn find_files(dir: &Path, predicate: &mut dyn FnMut(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_files(dir, predicate, &mut out)?;
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixed {
        result: Result<String, LookupError>,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn boxed(result: Result<String, LookupError>) -> Box<dyn CommitLookup> {
            Box::new(Self {
                result,
                calls: Cell::new(0),
            })
        }
    }

    impl CommitLookup for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn lookup(&self, _date: NaiveDate) -> Result<String, LookupError> {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    #[test]
    fn test_date_dir_name() {
        assert_eq!(date_dir_name(date(2023, 4, 6)), "2023_04_06");
    }

    #[test]
    fn test_primary_log_first_non_empty_hash_wins() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let rel = "performance-tester-dc1-default-sts-0/logs.txt";

        let failed = root.join("2023_04_16/lwt-fixed-100-partitions/run/").join(rel);
        fs::create_dir_all(failed.parent().unwrap()).unwrap();
        fs::write(&failed, "starting\nGit SHA: \nfailed\n").unwrap();

        let ok = root.join("2023_04_16/lwt-rated-100-partitions/run/").join(rel);
        fs::create_dir_all(ok.parent().unwrap()).unwrap();
        fs::write(&ok, "starting\nGit SHA: 1a2b3c4\ndone\n").unwrap();

        let lookup = PrimaryLogLookup::new(root, rel, "Git SHA: ");
        assert_eq!(lookup.lookup(date(2023, 4, 16)).unwrap(), "1a2b3c4");
    }

    #[test]
    fn test_primary_log_missing_date_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let lookup = PrimaryLogLookup::new(temp_dir.path(), "logs.txt", "Git SHA: ");
        assert!(matches!(
            lookup.lookup(date(2023, 4, 16)),
            Err(LookupError::NotFound(_))
        ));
    }

    #[test]
    fn test_primary_log_without_marker_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("2023_04_16/x/logs.txt");
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "nothing useful\n").unwrap();

        let lookup = PrimaryLogLookup::new(temp_dir.path(), "logs.txt", "Git SHA: ");
        assert!(matches!(
            lookup.lookup(date(2023, 4, 16)),
            Err(LookupError::NotFound(_))
        ));
    }

    #[test]
    fn test_harness_sha_log_takes_first_field() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("2023_04_16/fallout-tests_git_sha.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "9f8e7d6,2023-04-16 22:10:00\n").unwrap();

        let lookup = HarnessShaLogLookup::new(temp_dir.path(), "fallout-tests_git_sha.log");
        assert_eq!(lookup.lookup(date(2023, 4, 16)).unwrap(), "9f8e7d6");
    }

    #[test]
    fn test_harness_sha_log_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let lookup = HarnessShaLogLookup::new(temp_dir.path(), "fallout-tests_git_sha.log");
        assert!(matches!(
            lookup.lookup(date(2023, 4, 16)),
            Err(LookupError::NotFound(_))
        ));
    }

    #[test]
    fn test_git_history_on_plain_directory_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let lookup = GitHistoryLookup::new(temp_dir.path(), Duration::from_secs(10), 7);
        assert!(matches!(
            lookup.lookup(date(2023, 4, 16)),
            Err(LookupError::Unavailable(_))
        ));
    }

    #[test]
    fn test_fallback_returns_first_non_empty() {
        let chain = FallbackLookup::new(
            "primary",
            vec![
                Fixed::boxed(Err(LookupError::NotFound("logs".into()))),
                Fixed::boxed(Ok(String::new())),
                Fixed::boxed(Ok("abc1234".into())),
                Fixed::boxed(Ok("never".into())),
            ],
        );
        assert_eq!(chain.lookup(date(2023, 1, 1)).unwrap(), "abc1234");
    }

    #[test]
    fn test_fallback_prefers_reporting_unavailable_over_not_found() {
        let chain = FallbackLookup::new(
            "primary",
            vec![
                Fixed::boxed(Err(LookupError::Timeout(Duration::from_secs(1)))),
                Fixed::boxed(Err(LookupError::NotFound("logs".into()))),
            ],
        );
        assert!(matches!(
            chain.lookup(date(2023, 1, 1)),
            Err(LookupError::Timeout(_))
        ));
    }

    #[test]
    fn test_sources_degrade_to_empty() {
        let sources = ProvenanceSources::new(
            Fixed::boxed(Err(LookupError::Unavailable("git broken".into()))),
            Fixed::boxed(Ok("h4rn355".into())),
        );
        assert_eq!(
            sources.resolve(date(2023, 1, 1)),
            Provenance::new("", "h4rn355")
        );
    }

    #[test]
    fn test_sources_drop_multiline_hash() {
        let sources = ProvenanceSources::new(
            Fixed::boxed(Ok("1a2b3c4\nstray".into())),
            Fixed::boxed(Ok("h4rn355".into())),
        );
        assert_eq!(
            sources.resolve(date(2023, 1, 1)),
            Provenance::new("", "h4rn355")
        );
    }
}
