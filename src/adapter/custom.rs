//! Generic JSON results for tools that measure their own metrics.
//!
//! The payload is an array of records:
//!
//! ```json
//! [{"name": "wasmtime/http-throughput", "unit": "req/s", "value": 3782.4, "range": "± 12", "extra": "..."}]
//! ```
//!
//! The improvement direction comes from the tool id, not from the payload.

use serde::Deserialize;

use super::Adapter;
use crate::data::{Measurement, Tool};
use crate::error::{BenchError, BenchResult};

#[derive(Debug, Deserialize)]
struct CustomRecord {
    name: String,
    unit: String,
    value: f64,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    extra: Option<String>,
}

impl From<CustomRecord> for Measurement {
    fn from(record: CustomRecord) -> Self {
        Measurement {
            name: record.name,
            value: record.value,
            range: record.range,
            unit: record.unit,
            extra: record.extra,
        }
    }
}

pub struct CustomAdapter {
    tool: Tool,
}

impl CustomAdapter {
    pub const fn new(tool: Tool) -> Self {
        CustomAdapter { tool }
    }
}

impl Adapter for CustomAdapter {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn parse(&self, raw: &[u8]) -> BenchResult<Vec<Measurement>> {
        let records: Vec<CustomRecord> = serde_json::from_slice(raw).map_err(|e| {
            BenchError::parse(
                self.tool.as_str(),
                byte_offset(raw, e.line(), e.column()),
                e.to_string(),
            )
        })?;
        Ok(records.into_iter().map(Measurement::from).collect())
    }
}

/// Convert serde_json's 1-based line/column into a byte offset
fn byte_offset(raw: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = raw
        .split_inclusive(|&b| b == b'\n')
        .take(line.saturating_sub(1))
        .map(<[u8]>::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(raw.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_records() {
        let raw = serde_json::json!([
            {"name": "wasmtime/http-throughput", "unit": "req/s", "value": 3782.4061},
            {
                "name": "wamr/memory-usage",
                "unit": "kB",
                "value": 15916,
                "extra": "shim: 10752 kB\nzygote: 5164 kB"
            },
            {"name": "wasmtime/http-latency", "unit": "ms", "value": 1.25, "range": "± 0.1"}
        ])
        .to_string();

        let adapter = CustomAdapter::new(Tool::CustomBiggerIsBetter);
        let results = adapter.parse(raw.as_bytes()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].value, 3782.4061);
        assert_eq!(results[1].extra.as_deref(), Some("shim: 10752 kB\nzygote: 5164 kB"));
        assert_eq!(results[2].range.as_deref(), Some("± 0.1"));
    }

    #[test]
    fn test_stress_test_output_shape() {
        // Written by the stress-test runner's --json-output
        let raw = br#"[
  {
    "name": "Stress Test Tasks Throughput with mock service - wasmtime",
    "unit": "tasks/s",
    "value": 40.5,
    "extra": "Image: ghcr.io/containerd/runwasi/wasi-demo-app:latest\nTasks: 10\nParallel: 1\nDuration: 246ms"
  }
]"#;
        let adapter = CustomAdapter::new(Tool::CustomBiggerIsBetter);
        let results = adapter.parse(raw).unwrap();
        assert_eq!(results[0].unit, "tasks/s");
    }

    #[test]
    fn test_malformed_json_reports_offset() {
        let raw = b"[\n  {\"name\": \"a\", \"unit\": \"ms\", \"value\": \"fast\"}\n]";
        let adapter = CustomAdapter::new(Tool::CustomSmallerIsBetter);
        match adapter.parse(raw).unwrap_err() {
            BenchError::Parse { tool, offset, .. } => {
                assert_eq!(tool, "customSmallerIsBetter");
                assert!(offset > 2 && offset <= raw.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let adapter = CustomAdapter::new(Tool::CustomSmallerIsBetter);
        let err = adapter.parse(br#"[{"name": "a", "value": 1}]"#).unwrap_err();
        assert!(matches!(err, BenchError::Parse { .. }));
    }
}
