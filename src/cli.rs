//! Command-line interface argument parsing for benchtrack.
//!
//! - `benchtrack ingest --tool cargo --suite "Criterion.rs Benchmark" --commit-file commit.json --input out.txt --store dev/bench/data.js`
//! - `benchtrack alerts --store dev/bench/data.js --suite "HTTP Latency" --threshold 50%`
//! - `benchtrack history --suite "HTTP Latency" --name wasmtime/p99`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::ingest::MergeConfig;
use crate::regression::DetectorConfig;

/// Record benchmark runs in a shared history document and flag regressions.
#[derive(Parser, Debug)]
#[command(name = "benchtrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a benchmark tool's output and append it to the history
    Ingest {
        /// Tool that produced the output: cargo, customBiggerIsBetter,
        /// customSmallerIsBetter, heyThroughput, heyLatency
        #[arg(short, long)]
        tool: String,

        /// Suite the run belongs to
        #[arg(short, long)]
        suite: String,

        /// JSON file describing the commit (id, message, timestamp, author, committer, url)
        #[arg(short, long)]
        commit_file: PathBuf,

        /// Captured tool output
        #[arg(short, long)]
        input: PathBuf,

        /// Run time in epoch milliseconds. Defaults to now
        #[arg(long)]
        date: Option<i64>,

        /// Repository URL to record in a new document
        #[arg(long)]
        repo_url: Option<String>,

        /// Also check the run for regressions (ratio like 0.5 or percentage like 50%)
        #[arg(long, value_parser = parse_threshold)]
        alert_threshold: Option<f64>,

        /// Exit with 1 when a regression is found
        #[arg(long, requires = "alert_threshold")]
        fail_on_regression: bool,

        /// Number of prior runs averaged into the baseline
        #[arg(short, long, default_value = "1")]
        window: usize,

        /// Compare-and-swap retries before giving up
        #[arg(long, env = "BENCHTRACK_MAX_RETRIES", default_value = "5")]
        max_retries: u32,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Check a suite's newest run against its history
    Alerts {
        #[arg(short, long)]
        suite: String,

        /// Minimum degradation to report (ratio like 0.5 or percentage like 50%)
        #[arg(short, long, value_parser = parse_threshold)]
        threshold: f64,

        /// Number of prior runs averaged into the baseline
        #[arg(short, long, default_value = "1")]
        window: usize,

        /// Exit with 1 when any alert is reported
        #[arg(long)]
        fail_on_regression: bool,

        /// Print alerts as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print one measurement's series as tab-separated date, value, range
    History {
        #[arg(short, long)]
        suite: String,

        /// Measurement name
        #[arg(short, long)]
        name: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// List suites with their entry counts
    Suites {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// History document (path or file:// URL; `.js` selects the dashboard script form).
    /// Defaults to $BENCHTRACK_STORE, then the user data directory
    #[arg(long)]
    pub store: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Accept `0.5`, `50%` or `150 %`
pub fn parse_threshold(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    let (number, scale) = match trimmed.strip_suffix('%') {
        Some(pct) => (pct.trim(), 100.0),
        None => (trimmed, 1.0),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("not a number: {raw:?}"))?;
    let ratio = value / scale;
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(format!("threshold must be a non-negative number: {raw:?}"));
    }
    Ok(ratio)
}

/// Resolve where the history document lives
pub fn resolve_store(store: Option<String>) -> Result<PathBuf, String> {
    let raw = store.or_else(|| std::env::var("BENCHTRACK_STORE").ok());

    match raw {
        Some(location) => {
            if let Some(path) = location.strip_prefix("file://") {
                Ok(PathBuf::from(path))
            } else if location.contains("://") {
                Err(format!("unsupported store URL: {location}"))
            } else {
                Ok(PathBuf::from(location))
            }
        }
        None => Ok(dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("benchtrack")
            .join("data.json")),
    }
}

/// Detection settings derived from CLI arguments
pub fn detector_config(threshold: f64, window: usize) -> DetectorConfig {
    DetectorConfig::new(threshold).with_window(window)
}

/// Merge settings derived from CLI arguments
pub fn merge_config(max_retries: u32) -> MergeConfig {
    MergeConfig {
        max_retries,
        ..MergeConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold("0.5"), Ok(0.5));
        assert_eq!(parse_threshold("50%"), Ok(0.5));
        assert_eq!(parse_threshold("150 %"), Ok(1.5));
        assert!(parse_threshold("fast").is_err());
        assert!(parse_threshold("-1").is_err());
    }

    #[test]
    fn test_resolve_store() {
        assert_eq!(
            resolve_store(Some("dev/bench/data.js".to_string())),
            Ok(PathBuf::from("dev/bench/data.js"))
        );
        assert_eq!(
            resolve_store(Some("file:///tmp/data.json".to_string())),
            Ok(PathBuf::from("/tmp/data.json"))
        );
        assert!(resolve_store(Some("s3://bucket/data.json".to_string())).is_err());
    }

    #[test]
    fn test_ingest_arguments() {
        let cli = Cli::try_parse_from([
            "benchtrack",
            "ingest",
            "--tool",
            "cargo",
            "--suite",
            "Criterion.rs Benchmark",
            "--commit-file",
            "commit.json",
            "--input",
            "output.txt",
            "--store",
            "data.js",
            "--alert-threshold",
            "200%",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                tool,
                suite,
                alert_threshold,
                window,
                store,
                ..
            } => {
                assert_eq!(tool, "cargo");
                assert_eq!(suite, "Criterion.rs Benchmark");
                assert_eq!(alert_threshold, Some(2.0));
                assert_eq!(window, 1);
                assert_eq!(store.store.as_deref(), Some("data.js"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_fail_on_regression_requires_threshold() {
        let result = Cli::try_parse_from([
            "benchtrack",
            "ingest",
            "--tool",
            "cargo",
            "--suite",
            "s",
            "--commit-file",
            "c.json",
            "--input",
            "o.txt",
            "--fail-on-regression",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_alerts_requires_threshold() {
        assert!(Cli::try_parse_from(["benchtrack", "alerts", "--suite", "s"]).is_err());
    }
}
