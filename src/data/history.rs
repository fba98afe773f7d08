//! Append-only, per-suite history of benchmark entries.
//!
//! Entries are kept in a growable vector per suite, ordered by date and
//! addressed by position. There is no removal or in-place update.

use std::collections::HashSet;

use tracing::debug;

use super::models::{Direction, Document, Entry};
use crate::error::{BenchError, BenchResult};

/// One sample of a measurement's time series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub date: i64,
    pub value: f64,
    /// Absolute noise spread, when the tool reported one
    pub range: Option<f64>,
}

/// Single owner of a `Document`; all mutation goes through `append`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    document: Document,
}

impl HistoryStore {
    pub fn new(document: Document) -> Self {
        HistoryStore { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Set the repository URL if none is recorded yet
    pub fn adopt_repo_url(&mut self, repo_url: &str) {
        if self.document.repo_url.is_empty() && !repo_url.is_empty() {
            self.document.repo_url = repo_url.to_string();
        }
    }

    /// Raise `lastUpdate` to `timestamp` if it is newer
    pub fn touch(&mut self, timestamp: i64) {
        self.document.last_update = self.document.last_update.max(timestamp);
    }

    /// Insert `entry` into `suite`, keeping the suite sorted by date.
    ///
    /// Returns the index the entry landed at. Fails with `Conflict` when the
    /// suite already has an entry for the same commit and date; callers that
    /// retry submissions treat that as success.
    pub fn append(&mut self, suite: &str, entry: Entry) -> BenchResult<usize> {
        validate_benches(&entry)?;

        let entries = self.entries(suite);
        if entries.iter().any(|e| e.key() == entry.key()) {
            return Err(BenchError::Conflict {
                suite: suite.to_string(),
                commit: entry.commit.id().to_string(),
                date: entry.date,
            });
        }
        self.check_directions(suite, &entry)?;

        let date = entry.date;
        let entries = self.document.entries.entry(suite.to_string()).or_default();
        let index = entries.partition_point(|e| e.date <= date);
        entries.insert(index, entry);
        self.touch(date);

        debug!(suite, index, date, "Appended entry");
        Ok(index)
    }

    /// Every measurement name must keep the improvement direction it was
    /// first recorded with.
    fn check_directions(&self, suite: &str, entry: &Entry) -> BenchResult<()> {
        let current = entry.tool.direction();
        for bench in &entry.benches {
            if let Some(previous) = self.direction_of(suite, &bench.name) {
                if previous != current {
                    return Err(BenchError::SchemaViolation {
                        suite: suite.to_string(),
                        name: bench.name.clone(),
                        previous,
                        current,
                    });
                }
            }
        }
        Ok(())
    }

    /// Direction recorded for a measurement in this suite, if it has history
    pub fn direction_of(&self, suite: &str, name: &str) -> Option<Direction> {
        self.entries(suite)
            .iter()
            .find(|e| e.measurement(name).is_some())
            .map(|e| e.tool.direction())
    }

    /// Suite names in document order
    pub fn suites(&self) -> impl Iterator<Item = &str> {
        self.document.entries.keys().map(String::as_str)
    }

    /// All entries of a suite, oldest first
    pub fn entries(&self, suite: &str) -> &[Entry] {
        self.document
            .entries
            .get(suite)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn latest(&self, suite: &str) -> Option<&Entry> {
        self.entries(suite).last()
    }

    /// Entries of `suite` that come before `entry` in history.
    ///
    /// If `entry` is stored, that is everything ahead of its position;
    /// otherwise everything dated at or before it.
    pub fn preceding(&self, suite: &str, entry: &Entry) -> &[Entry] {
        let entries = self.entries(suite);
        let end = entries
            .iter()
            .position(|e| e.key() == entry.key())
            .unwrap_or_else(|| entries.partition_point(|e| e.date <= entry.date));
        &entries[..end]
    }

    /// Time series of one measurement, oldest first.
    ///
    /// The iterator is lazy and `Clone`, so it can be restarted.
    pub fn history<'a>(
        &'a self,
        suite: &str,
        name: &'a str,
    ) -> impl Iterator<Item = HistoryPoint> + Clone + 'a {
        self.entries(suite).iter().filter_map(move |entry| {
            entry.measurement(name).map(|m| HistoryPoint {
                date: entry.date,
                value: m.value,
                range: m.spread(),
            })
        })
    }

    /// Distinct measurement names of a suite, in first-seen order
    pub fn measurement_names(&self, suite: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries(suite)
            .iter()
            .flat_map(|e| e.benches.iter())
            .map(|m| m.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

fn validate_benches(entry: &Entry) -> BenchResult<()> {
    let mut seen = HashSet::new();
    for bench in &entry.benches {
        bench.validate()?;
        if !seen.insert(bench.name.as_str()) {
            return Err(BenchError::InvalidMeasurement {
                name: bench.name.clone(),
                reason: "duplicate name within entry".to_string(),
            });
        }
    }
    Ok(())
}
