//! Summary output from the `hey` HTTP load generator.
//!
//! `hey` prints a human-readable report. Two figures are kept, each recorded
//! under its own tool id so that it lands with the right direction:
//!
//! ```text
//! Summary:
//!   Requests/sec:	5181.9658
//! ...
//! Latency distribution:
//!   95% in 0.0160 secs
//! ```
//!
//! Throughput becomes `HTTP RPS` (req/s, bigger is better) and the 95th
//! percentile becomes `HTTP p95 Latency` (ms, smaller is better).

use std::sync::LazyLock;

use regex::Regex;

use super::Adapter;
use crate::data::{Measurement, Tool};
use crate::error::{BenchError, BenchResult};

static REQUESTS_PER_SEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Requests/sec:\s*(\S+)\s*$")
        .expect("REQUESTS_PER_SEC regex should compile")
});

static P95_LATENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*95% in (\S+) secs\s*$").expect("P95_LATENCY regex should compile")
});

const LATENCY_SECTION: &str = "Latency distribution:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeyMetric {
    Throughput,
    Latency,
}

pub struct HeyAdapter {
    metric: HeyMetric,
}

impl HeyAdapter {
    pub const fn new(metric: HeyMetric) -> Self {
        HeyAdapter { metric }
    }

    fn throughput(&self, text: &str) -> BenchResult<Measurement> {
        let caps = REQUESTS_PER_SEC
            .captures(text)
            .ok_or_else(|| BenchError::parse(self.id(), text.len(), "no Requests/sec line"))?;
        let value = self.number(&caps, 0)?;
        Ok(Measurement::new("HTTP RPS", value, "req/s"))
    }

    fn latency(&self, text: &str) -> BenchResult<Measurement> {
        let section = text
            .find(LATENCY_SECTION)
            .ok_or_else(|| BenchError::parse(self.id(), text.len(), "no latency distribution"))?;
        let caps = P95_LATENCY
            .captures(&text[section..])
            .ok_or_else(|| BenchError::parse(self.id(), section, "no 95th percentile line"))?;
        let secs = self.number(&caps, section)?;
        Ok(Measurement::new("HTTP p95 Latency", secs * 1000.0, "ms"))
    }

    /// First capture group as a number; `base` is where the haystack starts in the payload
    fn number(&self, caps: &regex::Captures<'_>, base: usize) -> BenchResult<f64> {
        let Some(group) = caps.get(1) else {
            return Err(BenchError::parse(self.id(), base, "missing number"));
        };
        group
            .as_str()
            .parse()
            .map_err(|_| BenchError::parse(self.id(), base + group.start(), "bad number"))
    }
}

impl Adapter for HeyAdapter {
    fn id(&self) -> &'static str {
        match self.metric {
            HeyMetric::Throughput => "heyThroughput",
            HeyMetric::Latency => "heyLatency",
        }
    }

    fn tool(&self) -> Tool {
        match self.metric {
            HeyMetric::Throughput => Tool::CustomBiggerIsBetter,
            HeyMetric::Latency => Tool::CustomSmallerIsBetter,
        }
    }

    fn parse(&self, raw: &[u8]) -> BenchResult<Vec<Measurement>> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| BenchError::parse(self.id(), e.valid_up_to(), "output is not UTF-8"))?;

        let measurement = match self.metric {
            HeyMetric::Throughput => self.throughput(text)?,
            HeyMetric::Latency => self.latency(text)?,
        };
        Ok(vec![measurement])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "
Summary:
  Total:\t0.0386 secs
  Slowest:\t0.0209 secs
  Fastest:\t0.0003 secs
  Average:\t0.0070 secs
  Requests/sec:\t5181.9658

  Total data:\t2600 bytes
  Size/request:\t13 bytes

Response time histogram:
  0.000 [1]\t|
  0.002 [91]\t|■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■■
  0.004 [35]\t|■■■■■■■■■■■■■■■
  0.006 [26]\t|■■■■■■■■■■■

Latency distribution:
  10% in 0.0011 secs
  25% in 0.0026 secs
  50% in 0.0055 secs
  75% in 0.0097 secs
  90% in 0.0143 secs
  95% in 0.0160 secs
  99% in 0.0200 secs

Details (average, fastest, slowest):
  DNS+dialup:\t0.0010 secs, 0.0003 secs, 0.0209 secs
  req write:\t0.0000 secs, 0.0000 secs, 0.0006 secs

Status code distribution:
  [200]\t200 responses
";

    #[test]
    fn test_throughput() {
        let adapter = HeyAdapter::new(HeyMetric::Throughput);
        let results = adapter.parse(OUTPUT.as_bytes()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "HTTP RPS");
        assert_eq!(results[0].unit, "req/s");
        assert_eq!(results[0].value, 5181.9658);
        assert_eq!(adapter.tool(), Tool::CustomBiggerIsBetter);
    }

    #[test]
    fn test_p95_latency_in_milliseconds() {
        let adapter = HeyAdapter::new(HeyMetric::Latency);
        let results = adapter.parse(OUTPUT.as_bytes()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "HTTP p95 Latency");
        assert_eq!(results[0].unit, "ms");
        assert_eq!(results[0].value, 0.0160 * 1000.0);
        assert_eq!(adapter.tool(), Tool::CustomSmallerIsBetter);
    }

    #[test]
    fn test_percentile_outside_distribution_is_ignored() {
        let raw = "  95% in 0.5 secs\nLatency distribution:\n  50% in 0.1 secs\n";
        let err = HeyAdapter::new(HeyMetric::Latency)
            .parse(raw.as_bytes())
            .unwrap_err();
        assert!(matches!(err, BenchError::Parse { ref tool, .. } if tool == "heyLatency"));
    }

    #[test]
    fn test_missing_or_bad_throughput() {
        let adapter = HeyAdapter::new(HeyMetric::Throughput);
        assert!(adapter.parse(b"Error: connection refused\n").is_err());

        let raw = "Summary:\n  Requests/sec:\tNaN-ish\n";
        match adapter.parse(raw.as_bytes()).unwrap_err() {
            BenchError::Parse { offset, .. } => {
                assert_eq!(offset, raw.find("NaN-ish").unwrap());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
