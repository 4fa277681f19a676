//! Benchmark metric vocabulary
//!
//! Every metric the detector can report is enumerated here together with the
//! direction in which it degrades. Names may carry a `.read` / `.write` phase
//! suffix (the CSV columns fed to the detector are phase-qualified), but the
//! base name must match the table exactly. Prefix matching is never used.

use std::fmt;

/// Direction in which a metric gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lower is worse (throughput): a negative change is a regression
    HigherIsBetter,
    /// Higher is worse (latency, spread): a positive change is a regression
    LowerIsBetter,
}

/// The fixed set of metrics extracted from a load-test report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    TotalOps,
    OpRate,
    MinLat,
    AvgLat,
    MedianLat,
    P95,
    P99,
    P999,
    MaxLat,
    Mad,
    Iqr,
}

/// (kind, detector/CSV name, report column name, direction)
const METRIC_TABLE: [(MetricKind, &str, &str, Direction); 11] = [
    (MetricKind::TotalOps, "totalOps", "Total Operations", Direction::HigherIsBetter),
    (MetricKind::OpRate, "opRate", "Op Rate", Direction::HigherIsBetter),
    (MetricKind::MinLat, "minLat", "Min Latency", Direction::LowerIsBetter),
    (MetricKind::AvgLat, "avgLat", "Avg Latency", Direction::LowerIsBetter),
    (MetricKind::MedianLat, "medianLat", "Median Latency", Direction::LowerIsBetter),
    (MetricKind::P95, "p95", "95th Latency", Direction::LowerIsBetter),
    (MetricKind::P99, "p99", "99th Latency", Direction::LowerIsBetter),
    (MetricKind::P999, "p99.9", "99.9th Latency", Direction::LowerIsBetter),
    (MetricKind::MaxLat, "maxLat", "Max Latency", Direction::LowerIsBetter),
    (MetricKind::Mad, "MAD", "Median Absolute Deviation", Direction::LowerIsBetter),
    (MetricKind::Iqr, "IQR", "Interquartile Range", Direction::LowerIsBetter),
];

impl MetricKind {
    /// All metrics in report column order
    pub const ALL: [MetricKind; 11] = [
        MetricKind::TotalOps,
        MetricKind::OpRate,
        MetricKind::MinLat,
        MetricKind::AvgLat,
        MetricKind::MedianLat,
        MetricKind::P95,
        MetricKind::P99,
        MetricKind::P999,
        MetricKind::MaxLat,
        MetricKind::Mad,
        MetricKind::Iqr,
    ];

    fn row(self) -> &'static (MetricKind, &'static str, &'static str, Direction) {
        // METRIC_TABLE is ordered like the enum
        &METRIC_TABLE[self as usize]
    }

    /// Short name used in CSV headers and detector output (e.g. `p99.9`)
    pub fn short_name(self) -> &'static str {
        self.row().1
    }

    /// Column name in the raw performance report (e.g. `99.9th Latency`)
    pub fn report_column(self) -> &'static str {
        self.row().2
    }

    pub fn direction(self) -> Direction {
        self.row().3
    }

    /// Exact lookup by short name
    pub fn from_short_name(name: &str) -> Option<Self> {
        METRIC_TABLE
            .iter()
            .find(|(_, short, _, _)| *short == name)
            .map(|(kind, _, _, _)| *kind)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Workload phase a metric was measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricPhase {
    Read,
    Write,
}

impl MetricPhase {
    pub const ALL: [MetricPhase; 2] = [MetricPhase::Read, MetricPhase::Write];

    /// Lowercase phase name as it appears in report `test` labels
    pub fn as_str(self) -> &'static str {
        match self {
            MetricPhase::Read => "read",
            MetricPhase::Write => "write",
        }
    }

    /// Column suffix, including the leading dot
    pub fn suffix(self) -> &'static str {
        match self {
            MetricPhase::Read => ".read",
            MetricPhase::Write => ".write",
        }
    }
}

/// A metric name as reported by the detector, e.g. `opRate` or `p99.9.write`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricName {
    pub kind: MetricKind,
    pub phase: Option<MetricPhase>,
}

impl MetricName {
    /// Parse a detector metric name; `None` when the base is not a known metric
    pub fn parse(name: &str) -> Option<Self> {
        for phase in MetricPhase::ALL {
            if let Some(base) = name.strip_suffix(phase.suffix()) {
                if let Some(kind) = MetricKind::from_short_name(base) {
                    return Some(Self {
                        kind,
                        phase: Some(phase),
                    });
                }
            }
        }

        MetricKind::from_short_name(name).map(|kind| Self { kind, phase: None })
    }

    /// Column name for CSV output (`opRate.read`)
    pub fn column(kind: MetricKind, phase: MetricPhase) -> String {
        format!("{}{}", kind.short_name(), phase.suffix())
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "{}{}", self.kind, phase.suffix()),
            None => write!(f, "{}", self.kind),
        }
    }
}
