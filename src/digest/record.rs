// Change records and their canonical rendering
//
// A ChangeRecord is one metric change at one run of one test type. Its
// rendered sentence is what the mailing list reads and what the ledger stores.
// Deduplication uses ChangeKey instead of the sentence so that a later
// provenance resolution (or a reworded template) does not re-notify.

use crate::digest::error::{DigestError, Result};
use crate::metric::MetricName;
use crate::provenance::Provenance;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::fmt;

/// A run's date-time as written by the detector, plus its parsed instant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunTimestamp {
    text: String,
    date: NaiveDate,
    /// Instant of the run in UTC; a missing offset is read as UTC
    instant: NaiveDateTime,
}

impl RunTimestamp {
    /// Parse `2022-01-01 23:00:00 +0000` (time and offset optional)
    ///
    /// The text is rendered verbatim into ledger lines, so control characters
    /// are rejected rather than carried through.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || DigestError::MalformedTimestamp(text.to_string());
        if text.chars().any(char::is_control) {
            return Err(malformed());
        }

        let trimmed = text.trim();
        let (date_part, rest) = match trimmed.find([' ', 'T']) {
            Some(i) => (&trimmed[..i], trimmed[i + 1..].trim()),
            None => (trimmed, ""),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| malformed())?;
        let (time, offset) = parse_time_and_offset(rest).ok_or_else(malformed)?;
        let instant = offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(malformed)?
            .naive_utc();

        Ok(Self {
            text: text.to_string(),
            date,
            instant,
        })
    }

    /// Run instant normalized to UTC
    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    /// Literal detector text, used verbatim when rendering
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

fn parse_time_and_offset(rest: &str) -> Option<(NaiveTime, FixedOffset)> {
    let utc = FixedOffset::east_opt(0)?;
    if rest.is_empty() {
        return Some((NaiveTime::from_hms_opt(0, 0, 0)?, utc));
    }

    let (time_part, offset) = if let Some(time_part) = rest.strip_suffix('Z') {
        (time_part, utc)
    } else if let Some(i) = rest.rfind(['+', '-']) {
        (&rest[..i], parse_offset(&rest[i..])?)
    } else {
        (rest, utc)
    };

    let time_part = time_part.trim();
    let time = NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time_part, "%H:%M"))
        .ok()?;
    Some((time, offset))
}

/// `+0000`, `-05:30` or `+02`
fn parse_offset(text: &str) -> Option<FixedOffset> {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let digits: String = text.get(1..)?.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Names of the two tracked repositories as they appear in rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderLabels {
    pub primary: String,
    pub harness: String,
}

impl Default for RenderLabels {
    fn default() -> Self {
        Self {
            primary: "cassandra".to_string(),
            harness: "fallout-tests".to_string(),
        }
    }
}

/// Identity of a change for deduplication; provenance is not part of it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeKey {
    pub test_type: String,
    /// Run instant in UTC
    pub run_at: NaiveDateTime,
    pub metric: MetricName,
    /// Percent change rounded to hundredths
    pub percent_centi: i64,
}

impl ChangeKey {
    pub fn new(
        test_type: impl Into<String>,
        run_at: NaiveDateTime,
        metric: MetricName,
        percent: f64,
    ) -> Self {
        Self {
            test_type: test_type.into(),
            run_at,
            metric,
            percent_centi: (percent * 100.0).round() as i64,
        }
    }
}

/// One detector-reported change with its run context
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub test_type: String,
    pub timestamp: RunTimestamp,
    pub metric: MetricName,
    pub forward_change_percent: f64,
    /// Detector spelling of the percentage (`"20"`, `"-12.50"`)
    pub percent_text: String,
    pub provenance: Provenance,
}

impl ChangeRecord {
    /// Build a record from raw detector fields
    ///
    /// Fails with `UnknownMetricKind` for a metric outside the known set,
    /// `InvalidPercent` for a non-numeric or non-finite percentage and
    /// `InvalidTestType` for a test type that cannot sit on one ledger line.
    pub fn new(
        test_type: impl Into<String>,
        timestamp: RunTimestamp,
        metric: &str,
        percent_text: &str,
        provenance: Provenance,
    ) -> Result<Self> {
        let test_type = test_type.into();
        if test_type.chars().any(char::is_control) {
            return Err(DigestError::InvalidTestType(test_type));
        }

        let metric_name =
            MetricName::parse(metric).ok_or_else(|| DigestError::UnknownMetricKind(metric.to_string()))?;

        let percent_text = percent_text.trim();
        let forward_change_percent = percent_text
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| DigestError::InvalidPercent {
                metric: metric.to_string(),
                value: percent_text.to_string(),
            })?;

        Ok(Self {
            test_type,
            timestamp,
            metric: metric_name,
            forward_change_percent,
            percent_text: percent_text.to_string(),
            provenance,
        })
    }

    pub fn key(&self) -> ChangeKey {
        ChangeKey::new(
            self.test_type.clone(),
            self.timestamp.instant(),
            self.metric,
            self.forward_change_percent,
        )
    }

    /// Canonical one-line rendering (no trailing newline)
    pub fn render(&self, labels: &RenderLabels) -> String {
        format!(
            "For the test '{}' on date and time '{}' that ran on {} Git commit SHA '{}' \
             and on {} Git commit SHA '{}': The metric '{}' changed by {}%.",
            self.test_type,
            self.timestamp,
            labels.primary,
            self.provenance.primary_commit,
            labels.harness,
            self.provenance.harness_commit,
            self.metric,
            self.percent_text,
        )
    }
}
