//! Read-only access to the last persisted document.
//!
//! A `View` is a snapshot: it never observes writes made after it was
//! opened, and opening one takes no lock.

use crate::data::{Entry, HistoryPoint, HistoryStore, Storage, Version};
use crate::error::BenchResult;
use crate::regression::{RegressionAlert, RegressionDetector};

pub struct View {
    store: HistoryStore,
    version: Version,
}

impl View {
    /// Snapshot the store's current contents
    pub fn open(storage: &Storage) -> BenchResult<Self> {
        let snapshot = storage.load()?;
        Ok(View {
            store: HistoryStore::new(snapshot.document),
            version: snapshot.version,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn last_update(&self) -> i64 {
        self.store.document().last_update
    }

    pub fn repo_url(&self) -> &str {
        &self.store.document().repo_url
    }

    pub fn suites(&self) -> impl Iterator<Item = &str> {
        self.store.suites()
    }

    pub fn entries(&self, suite: &str) -> &[Entry] {
        self.store.entries(suite)
    }

    pub fn latest(&self, suite: &str) -> Option<&Entry> {
        self.store.latest(suite)
    }

    pub fn measurement_names(&self, suite: &str) -> Vec<&str> {
        self.store.measurement_names(suite)
    }

    pub fn history<'a>(
        &'a self,
        suite: &str,
        name: &'a str,
    ) -> impl Iterator<Item = HistoryPoint> + Clone + 'a {
        self.store.history(suite, name)
    }

    /// Evaluate the newest entry of `suite` against the entries before it
    pub fn latest_alerts(
        &self,
        suite: &str,
        detector: &RegressionDetector,
    ) -> Vec<RegressionAlert> {
        self.latest(suite)
            .map(|entry| detector.evaluate(&self.store, suite, entry))
            .unwrap_or_default()
    }
}
