//! Regression detection against prior history.
//!
//! A new measurement is compared with the mean of the same measurement over
//! the preceding `window` entries of its suite. The relative change is signed
//! so that positive always means worse, then checked against both the fixed
//! threshold and the combined noise band of the samples involved.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::data::{Direction, Entry, HistoryStore, Measurement};

/// Detection parameters. There is no built-in threshold; callers supply one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum relative degradation to report, e.g. 0.5 for 50%
    pub threshold: f64,
    /// How many prior samples form the baseline
    pub window: usize,
}

impl DetectorConfig {
    pub fn new(threshold: f64) -> Self {
        DetectorConfig {
            threshold,
            window: 1,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }
}

/// A measurement that got significantly worse
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionAlert {
    pub suite: String,
    pub measurement_name: String,
    pub baseline: f64,
    pub observed: f64,
    /// Relative change, positive meaning worse
    pub delta_ratio: f64,
    pub unit: String,
}

impl fmt::Display for RegressionAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}: {} {} -> {} {} ({:+.1}%)",
            self.suite,
            self.measurement_name,
            self.baseline,
            self.unit,
            self.observed,
            self.unit,
            self.delta_ratio * 100.0
        )
    }
}

/// Stateless evaluator; safe to share between threads
#[derive(Debug, Clone, Copy)]
pub struct RegressionDetector {
    config: DetectorConfig,
}

impl RegressionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        RegressionDetector { config }
    }

    /// Compare `entry` with whatever precedes it in `suite`.
    ///
    /// `entry` may or may not already be stored. Measurements without
    /// history produce no alert.
    pub fn evaluate(
        &self,
        store: &HistoryStore,
        suite: &str,
        entry: &Entry,
    ) -> Vec<RegressionAlert> {
        let prior = store.preceding(suite, entry);
        let direction = entry.tool.direction();

        entry
            .benches
            .iter()
            .filter_map(|current| {
                let window: Vec<&Measurement> = prior
                    .iter()
                    .rev()
                    .filter_map(|e| e.measurement(&current.name))
                    .take(self.config.window)
                    .collect();
                self.compare(suite, current, &window, direction)
            })
            .collect()
    }

    fn compare(
        &self,
        suite: &str,
        current: &Measurement,
        window: &[&Measurement],
        direction: Direction,
    ) -> Option<RegressionAlert> {
        let baseline = mean(window.iter().map(|m| m.value))?;
        if baseline == 0.0 {
            debug!(suite, name = %current.name, "Zero baseline, skipping");
            return None;
        }

        let change = (current.value - baseline) / baseline.abs();
        let delta = match direction {
            Direction::SmallerIsBetter => change,
            Direction::BiggerIsBetter => -change,
        };

        let baseline_spread = mean(window.iter().filter_map(|m| m.spread())).unwrap_or(0.0);
        let noise = (current.spread().unwrap_or(0.0) + baseline_spread) / baseline.abs();

        debug!(
            suite,
            name = %current.name,
            baseline,
            observed = current.value,
            delta,
            noise,
            "Compared with baseline"
        );

        (delta > self.config.threshold && delta > noise).then(|| RegressionAlert {
            suite: suite.to_string(),
            measurement_name: current.name.clone(),
            baseline,
            observed: current.value,
            delta_ratio: delta,
            unit: current.unit.clone(),
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::history::tests::make_entry;
    use crate::data::{Measurement, Tool};

    fn detector(threshold: f64, window: usize) -> RegressionDetector {
        RegressionDetector::new(DetectorConfig::new(threshold).with_window(window))
    }

    fn store_with(suite: &str, tool: Tool, values: &[f64]) -> HistoryStore {
        let mut store = HistoryStore::default();
        for (i, &v) in values.iter().enumerate() {
            let commit = format!("c{i}");
            store
                .append(suite, make_entry(&commit, i as i64, tool, &[("m", v)]))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_smaller_is_better_regression() {
        let store = store_with("s", Tool::CustomSmallerIsBetter, &[100.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 250.0)]);

        let alerts = detector(0.5, 1).evaluate(&store, "s", &entry);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].measurement_name, "m");
        assert_eq!(alerts[0].baseline, 100.0);
        assert_eq!(alerts[0].observed, 250.0);
        assert!((alerts[0].delta_ratio - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_small_change_is_clean() {
        let store = store_with("s", Tool::CustomSmallerIsBetter, &[100.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 105.0)]);
        assert!(detector(0.5, 1).evaluate(&store, "s", &entry).is_empty());
    }

    #[test]
    fn test_improvement_is_clean() {
        let store = store_with("s", Tool::CustomSmallerIsBetter, &[100.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 10.0)]);
        assert!(detector(0.5, 1).evaluate(&store, "s", &entry).is_empty());
    }

    #[test]
    fn test_bigger_is_better_drop_is_regression() {
        let store = store_with("s", Tool::CustomBiggerIsBetter, &[1000.0]);
        let entry = make_entry("new", 10, Tool::CustomBiggerIsBetter, &[("m", 400.0)]);

        let alerts = detector(0.5, 1).evaluate(&store, "s", &entry);
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].delta_ratio - 0.6).abs() < 1e-9);

        let faster = make_entry("new", 10, Tool::CustomBiggerIsBetter, &[("m", 3000.0)]);
        assert!(detector(0.5, 1).evaluate(&store, "s", &faster).is_empty());
    }

    #[test]
    fn test_window_averages_prior_samples() {
        let store = store_with("s", Tool::CustomSmallerIsBetter, &[1000.0, 100.0, 300.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 300.0)]);

        // Last two samples average to 200
        let alerts = detector(0.2, 2).evaluate(&store, "s", &entry);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].baseline, 200.0);

        // Default window only sees 300
        assert!(detector(0.2, 1).evaluate(&store, "s", &entry).is_empty());
    }

    #[test]
    fn test_noise_band_suppresses_alert() {
        let mut store = HistoryStore::default();
        let mut base = make_entry("a", 1, Tool::Cargo, &[]);
        base.benches
            .push(Measurement::new("m", 100.0, "ns/iter").with_range("± 40"));
        store.append("s", base).unwrap();

        // 70% worse, but both samples carry ±40 => 80% band
        let mut noisy = make_entry("b", 2, Tool::Cargo, &[]);
        noisy
            .benches
            .push(Measurement::new("m", 170.0, "ns/iter").with_range("± 40"));
        assert!(detector(0.5, 1).evaluate(&store, "s", &noisy).is_empty());

        let mut clear = make_entry("b", 2, Tool::Cargo, &[]);
        clear
            .benches
            .push(Measurement::new("m", 190.0, "ns/iter").with_range("± 40"));
        assert_eq!(detector(0.5, 1).evaluate(&store, "s", &clear).len(), 1);
    }

    #[test]
    fn test_first_entry_has_no_alerts() {
        let store = HistoryStore::default();
        let entry = make_entry("a", 1, Tool::Cargo, &[("m", 1e9)]);
        assert!(detector(0.1, 1).evaluate(&store, "s", &entry).is_empty());
    }

    #[test]
    fn test_stored_entry_is_not_its_own_baseline() {
        let mut store = store_with("s", Tool::CustomSmallerIsBetter, &[100.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 250.0)]);
        store.append("s", entry.clone()).unwrap();

        let alerts = detector(0.5, 1).evaluate(&store, "s", &entry);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].baseline, 100.0);
    }

    #[test]
    fn test_zero_baseline_skipped() {
        let store = store_with("s", Tool::CustomSmallerIsBetter, &[0.0]);
        let entry = make_entry("new", 10, Tool::CustomSmallerIsBetter, &[("m", 5.0)]);
        assert!(detector(0.5, 1).evaluate(&store, "s", &entry).is_empty());
    }
}
