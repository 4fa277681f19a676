// Performance report extraction
//
// A report's `stats` array holds one object per sub-test. Every object whose
// `test` name contains "result-success" and the phase name is merged (later
// objects win) and the eleven tracked columns are read from the merge.

use crate::ingest::error::{IngestError, Result};
use crate::metric::{MetricKind, MetricName, MetricPhase};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const SUCCESS_MARKER: &str = "result-success";

/// Raw `performance-report.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceReport {
    #[serde(default)]
    pub stats: Vec<Map<String, Value>>,
    #[serde(skip)]
    origin: String,
}

impl PerformanceReport {
    pub fn from_json_str(content: &str, origin: &str) -> Result<Self> {
        let mut report: Self =
            serde_json::from_str(content).map_err(|source| IngestError::Json {
                path: origin.to_string(),
                source,
            })?;
        report.origin = origin.to_string();
        Ok(report)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content, &path.display().to_string())
    }

    /// Merged successful results for one phase
    pub fn phase_stats(&self, phase: MetricPhase) -> Result<Map<String, Value>> {
        if self.stats.is_empty() {
            return Err(IngestError::NoStats(self.origin.clone()));
        }

        let mut merged = Map::new();
        for entry in &self.stats {
            let Some(test) = entry.get("test").and_then(Value::as_str) else {
                continue;
            };
            if test.contains(SUCCESS_MARKER) && test.contains(phase.as_str()) {
                merged.extend(entry.clone());
            }
        }

        if merged.is_empty() {
            return Err(IngestError::MissingPhase {
                path: self.origin.clone(),
                phase: phase.as_str().to_string(),
            });
        }
        Ok(merged)
    }

    /// One CSV cell per tracked metric and phase, e.g. `p99.read`
    pub fn metric_cells(&self) -> Result<Vec<(String, String)>> {
        let mut cells = Vec::with_capacity(MetricKind::ALL.len() * MetricPhase::ALL.len());

        for phase in MetricPhase::ALL {
            let stats = self.phase_stats(phase)?;
            for kind in MetricKind::ALL {
                let value = stats.get(kind.report_column()).ok_or_else(|| {
                    IngestError::MissingColumn {
                        path: self.origin.clone(),
                        phase: phase.as_str().to_string(),
                        column: kind.report_column().to_string(),
                    }
                })?;
                cells.push((MetricName::column(kind, phase), strip_unit(kind, value)));
            }
        }

        Ok(cells)
    }
}

/// Cell text without the unit the report appends
pub fn strip_unit(kind: MetricKind, value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let unit = match kind {
        MetricKind::TotalOps => return text.trim().to_string(),
        MetricKind::OpRate => " op/sec",
        _ => " ms",
    };
    text.trim_end()
        .strip_suffix(unit)
        .unwrap_or(text.trim_end())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_json() -> Value {
        let phase = |test: &str, scale: f64| {
            json!({
                "test": test,
                "Total Operations": "1,200,000",
                "Op Rate": format!("{} op/sec", 20000.0 * scale),
                "Min Latency": "0.3 ms",
                "Avg Latency": format!("{} ms", 2.5 * scale),
                "Median Latency": "2.1 ms",
                "95th Latency": "5.2 ms",
                "99th Latency": "9.8 ms",
                "99.9th Latency": "20.4 ms",
                "Max Latency": "110.0 ms",
                "Median Absolute Deviation": "0.4 ms",
                "Interquartile Range": "0.9 ms"
            })
        };
        json!({"stats": [
            {"test": "warmup-read"},
            phase("lwt-read-result-success", 1.0),
            phase("lwt-write-result-success", 2.0),
            {"test": "lwt-write-result-failure", "Op Rate": "1 op/sec"}
        ]})
    }

    #[test]
    fn test_metric_cells() {
        let report = PerformanceReport::from_json_str(&report_json().to_string(), "r.json").unwrap();
        let cells = report.metric_cells().unwrap();

        assert_eq!(cells.len(), 22);
        assert_eq!(cells[0], ("totalOps.read".to_string(), "1,200,000".to_string()));
        assert_eq!(cells[1], ("opRate.read".to_string(), "20000".to_string()));
        assert_eq!(cells[3], ("avgLat.read".to_string(), "2.5".to_string()));
        assert!(cells.contains(&("opRate.write".to_string(), "40000".to_string())));
        assert!(cells.contains(&("p99.9.write".to_string(), "20.4".to_string())));
        assert!(cells.contains(&("IQR.read".to_string(), "0.9".to_string())));
    }

    #[test]
    fn test_phase_merge_ignores_failures() {
        let report = PerformanceReport::from_json_str(&report_json().to_string(), "r.json").unwrap();
        let write = report.phase_stats(MetricPhase::Write).unwrap();
        assert_eq!(write["Op Rate"], json!("40000 op/sec"));
    }

    #[test]
    fn test_empty_stats() {
        let report = PerformanceReport::from_json_str(r#"{"stats": []}"#, "r.json").unwrap();
        assert!(matches!(report.metric_cells(), Err(IngestError::NoStats(_))));
    }

    #[test]
    fn test_missing_phase() {
        let report = PerformanceReport::from_json_str(
            r#"{"stats": [{"test": "lwt-read-result-success", "Op Rate": "1 op/sec"}]}"#,
            "r.json",
        )
        .unwrap();
        assert!(matches!(
            report.phase_stats(MetricPhase::Write),
            Err(IngestError::MissingPhase { .. })
        ));
    }

    #[test]
    fn test_missing_column() {
        let report = PerformanceReport::from_json_str(
            r#"{"stats": [{"test": "lwt-read-result-success", "Op Rate": "1 op/sec"}]}"#,
            "r.json",
        )
        .unwrap();
        assert!(matches!(
            report.metric_cells(),
            Err(IngestError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PerformanceReport::from_json_str("{", "r.json"),
            Err(IngestError::Json { .. })
        ));
    }

    #[test]
    fn test_strip_unit() {
        assert_eq!(strip_unit(MetricKind::OpRate, &json!("123.4 op/sec")), "123.4");
        assert_eq!(strip_unit(MetricKind::P99, &json!("9.8 ms")), "9.8");
        assert_eq!(strip_unit(MetricKind::P99, &json!(9.8)), "9.8");
        assert_eq!(strip_unit(MetricKind::TotalOps, &json!(1200)), "1200");
        assert_eq!(strip_unit(MetricKind::MaxLat, &json!("7 ms ")), "7");
    }
}
