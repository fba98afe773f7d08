//! Data models for the benchmark history document.
//!
//! Field names and order follow the document consumed by the dashboard:
//! `{lastUpdate, repoUrl, entries: {suite: [Entry]}}`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{BenchError, BenchResult};

/// Largest integer an f64 represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Root of the persisted history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub last_update: i64,
    pub repo_url: String,
    /// Suite name -> entries ordered by date. Insertion order of suites is kept.
    pub entries: IndexMap<String, Vec<Entry>>,
}

/// One benchmark run for a single commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub commit: Commit,
    /// Epoch milliseconds
    pub date: i64,
    pub tool: Tool,
    pub benches: Vec<Measurement>,
}

impl Entry {
    pub fn new(commit: Commit, date: i64, tool: Tool, benches: Vec<Measurement>) -> Self {
        Entry {
            commit,
            date,
            tool,
            benches,
        }
    }

    /// Look up a measurement by name
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.benches.iter().find(|m| m.name == name)
    }

    /// Identity used for duplicate detection within a suite
    pub fn key(&self) -> (&str, i64) {
        (self.commit.id(), self.date)
    }
}

/// Commit metadata as supplied by CI.
///
/// Held as the raw JSON object, keys in their original order, and written
/// back untouched. Only `id` is read; it must be a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Commit {
    id: String,
    record: Map<String, Value>,
}

impl Commit {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl TryFrom<Map<String, Value>> for Commit {
    type Error = String;

    fn try_from(record: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(format!("commit id must be a string, got {other}")),
            None => return Err("commit has no id".to_string()),
        };
        Ok(Commit { id, record })
    }
}

impl From<Commit> for Map<String, Value> {
    fn from(commit: Commit) -> Self {
        commit.record
    }
}

/// Which way a value has to move to count as an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    BiggerIsBetter,
    SmallerIsBetter,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BiggerIsBetter => write!(f, "bigger-is-better"),
            Direction::SmallerIsBetter => write!(f, "smaller-is-better"),
        }
    }
}

/// The benchmark tool that produced an entry.
///
/// Selects both the output parser and the improvement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    /// libtest / Criterion bencher output (`ns/iter`)
    #[serde(rename = "cargo")]
    Cargo,
    #[serde(rename = "customBiggerIsBetter")]
    CustomBiggerIsBetter,
    #[serde(rename = "customSmallerIsBetter")]
    CustomSmallerIsBetter,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Cargo => "cargo",
            Tool::CustomBiggerIsBetter => "customBiggerIsBetter",
            Tool::CustomSmallerIsBetter => "customSmallerIsBetter",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Tool::CustomBiggerIsBetter => Direction::BiggerIsBetter,
            Tool::Cargo | Tool::CustomSmallerIsBetter => Direction::SmallerIsBetter,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named result within an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
    /// Noise band as written by the tool, e.g. "± 112112717"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub unit: String,
    /// Free-form annotation; stored verbatim, never interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Measurement {
            name: name.into(),
            value,
            range: None,
            unit: unit.into(),
            extra: None,
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Reject measurements that cannot be stored meaningfully
    pub fn validate(&self) -> BenchResult<()> {
        let invalid = |reason: &str| BenchError::InvalidMeasurement {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if !self.value.is_finite() {
            return Err(invalid("value is not finite"));
        }
        if self.unit.trim().is_empty() {
            return Err(invalid("empty unit"));
        }
        Ok(())
    }

    /// Absolute noise spread derived from `range`, if it can be read.
    pub fn spread(&self) -> Option<f64> {
        self.range
            .as_deref()
            .and_then(|range| parse_spread(range, self.value))
    }
}

/// Read "± 123", "+/- 1,234", "12.5" or "5%" as an absolute spread.
pub(crate) fn parse_spread(range: &str, value: f64) -> Option<f64> {
    let trimmed = range.trim();
    let body = trimmed
        .strip_prefix('±')
        .or_else(|| trimmed.strip_prefix("+/-"))
        .unwrap_or(trimmed)
        .trim();

    let spread = match body.strip_suffix('%') {
        Some(pct) => pct.trim().replace(',', "").parse::<f64>().ok()? * value.abs() / 100.0,
        None => body.replace(',', "").parse::<f64>().ok()?,
    };

    (spread.is_finite() && spread >= 0.0).then_some(spread)
}

/// Integral values are written without a fractional part so that
/// documents produced by other writers survive a load/save unchanged.
fn serialize_value<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
