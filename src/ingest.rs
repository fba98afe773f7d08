//! Ingestion pipeline and merge coordinator.
//!
//! One ingestion parses tool output, then merges the resulting entry into the
//! shared document with optimistic concurrency: load with a version token,
//! append in memory, compare-and-swap. When another writer got there first
//! the whole load/append is redone against the fresh document. Duplicate
//! submissions collapse to a no-op, so a replay after a lost race (or a
//! retried CI job) never produces a second entry.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::adapter;
use crate::data::{CasOutcome, Commit, Entry, HistoryStore, Storage, Version};
use crate::error::{BenchError, BenchResult};
use crate::regression::{RegressionAlert, RegressionDetector};

/// Retry policy for compare-and-swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            max_retries: 5,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl MergeConfig {
    /// Delay before retry number `retry` (1-based), doubling each time
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Raw input of one ingestion call
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tool: String,
    pub suite: String,
    pub commit: Commit,
    /// Epoch milliseconds
    pub date: i64,
    pub payload: Vec<u8>,
}

/// An entry bound for a suite
#[derive(Debug, Clone)]
pub struct Submission {
    pub suite: String,
    pub entry: Entry,
}

/// What a merge did
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub appended: usize,
    pub duplicates: usize,
    pub alerts: Vec<RegressionAlert>,
    /// Compare-and-swap attempts made
    pub attempts: u32,
    /// Version written, `None` when nothing needed writing
    pub version: Option<Version>,
}

impl MergeReport {
    /// Every submission was already present
    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

/// Owns the store handle and serializes all writes through CAS
pub struct Coordinator {
    storage: Storage,
    merge: MergeConfig,
    detector: Option<RegressionDetector>,
    repo_url: Option<String>,
}

impl Coordinator {
    pub fn new(storage: Storage, merge: MergeConfig) -> Self {
        Coordinator {
            storage,
            merge,
            detector: None,
            repo_url: None,
        }
    }

    /// Evaluate appended entries for regressions
    pub fn with_detector(mut self, detector: RegressionDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Record this URL if the document does not have one yet
    pub fn with_repo_url(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self
    }

    /// Parse tool output and merge it as a single entry.
    ///
    /// Parse failures happen before the store is touched.
    pub fn ingest(&self, request: &IngestRequest) -> BenchResult<MergeReport> {
        let (tool, benches) = adapter::parse(&request.tool, &request.payload)?;
        let entry = Entry::new(request.commit.clone(), request.date, tool, benches);
        self.merge(&[Submission {
            suite: request.suite.clone(),
            entry,
        }])
    }

    /// Merge a batch of entries in one write.
    ///
    /// Either all new entries land or none do. A schema violation in any
    /// submission aborts the batch.
    pub fn merge(&self, batch: &[Submission]) -> BenchResult<MergeReport> {
        let attempts = self.merge.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let snapshot = self.storage.load()?;
            let mut store = HistoryStore::new(snapshot.document);

            let mut appended = Vec::new();
            let mut duplicates = 0;
            for submission in batch {
                match store.append(&submission.suite, submission.entry.clone()) {
                    Ok(_) => appended.push(submission),
                    Err(BenchError::Conflict { suite, commit, date }) => {
                        info!(%suite, %commit, date, "Entry already recorded, skipping");
                        duplicates += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            if appended.is_empty() {
                return Ok(MergeReport {
                    appended: 0,
                    duplicates,
                    alerts: Vec::new(),
                    attempts: attempt,
                    version: None,
                });
            }

            if let Some(repo_url) = &self.repo_url {
                store.adopt_repo_url(repo_url);
            }
            store.touch(Utc::now().timestamp_millis());

            let alerts: Vec<RegressionAlert> = match &self.detector {
                Some(detector) => appended
                    .iter()
                    .flat_map(|s| detector.evaluate(&store, &s.suite, &s.entry))
                    .collect(),
                None => Vec::new(),
            };

            match self
                .storage
                .compare_and_swap(&snapshot.version, store.document())?
            {
                CasOutcome::Written(version) => {
                    info!(
                        path = ?self.storage.path(),
                        appended = appended.len(),
                        duplicates,
                        attempt,
                        %version,
                        "History updated"
                    );
                    for alert in &alerts {
                        warn!(%alert, "Performance regression");
                    }
                    return Ok(MergeReport {
                        appended: appended.len(),
                        duplicates,
                        alerts,
                        attempts: attempt,
                        version: Some(version),
                    });
                }
                CasOutcome::Stale if attempt < attempts => {
                    let delay = self.merge.backoff(attempt);
                    debug!(attempt, ?delay, "Lost write race, retrying");
                    thread::sleep(delay);
                }
                CasOutcome::Stale => {}
            }
        }

        warn!(attempts, path = ?self.storage.path(), "Giving up on merge");
        Err(BenchError::MergeConflict { attempts })
    }
}
