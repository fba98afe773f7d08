//! benchtrack: continuous benchmark history for CI.
//!
//! Each CI job parses its benchmark tool's output and merges the run into a
//! shared history document. Parallel jobs writing the same document are
//! reconciled with compare-and-swap; the document stays sorted, duplicate-free
//! and readable by the dashboard at every point.

mod adapter;
mod cli;
mod data;
mod error;
mod ingest;
mod query;
mod regression;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use cli::{Cli, Commands, StoreArgs};
use data::{Commit, Storage};
use error::BenchError;
use ingest::{Coordinator, IngestRequest};
use query::View;
use regression::{RegressionAlert, RegressionDetector};
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<BenchError>()
                .map(BenchError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Ingest {
            tool,
            suite,
            commit_file,
            input,
            date,
            repo_url,
            alert_threshold,
            fail_on_regression,
            window,
            max_retries,
            store,
        } => {
            let commit = read_commit(&commit_file)?;
            let payload =
                fs::read(&input).with_context(|| format!("Failed to read tool output: {input:?}"))?;
            let request = IngestRequest {
                tool,
                suite,
                commit,
                date: date.unwrap_or_else(|| Utc::now().timestamp_millis()),
                payload,
            };

            let mut coordinator =
                Coordinator::new(open_storage(store)?, cli::merge_config(max_retries));
            if let Some(threshold) = alert_threshold {
                let config = cli::detector_config(threshold, window);
                coordinator = coordinator.with_detector(RegressionDetector::new(config));
            }
            if let Some(repo_url) = repo_url {
                coordinator = coordinator.with_repo_url(repo_url);
            }

            let report = coordinator.ingest(&request)?;
            if report.is_noop() {
                info!(
                    suite = %request.suite,
                    commit = %request.commit.id(),
                    "Run already recorded"
                );
                println!("already recorded: {} @ {}", request.commit.id(), request.date);
            } else {
                if let Some(version) = &report.version {
                    info!(attempts = report.attempts, %version, "Merged run");
                }
                println!(
                    "recorded {} @ {} in {:?}",
                    request.commit.id(), request.date, request.suite
                );
            }
            print_alerts(&report.alerts);

            Ok(exit_for_alerts(&report.alerts, fail_on_regression))
        }

        Commands::Alerts {
            suite,
            threshold,
            window,
            fail_on_regression,
            json,
            store,
        } => {
            let view = View::open(&open_storage(store)?)?;
            if view.latest(&suite).is_none() {
                return Err(anyhow!("suite {suite:?} has no entries"));
            }
            let detector = RegressionDetector::new(cli::detector_config(threshold, window));
            let alerts = view.latest_alerts(&suite, &detector);

            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else if alerts.is_empty() {
                println!("no regressions in {suite:?}");
            } else {
                print_alerts(&alerts);
            }

            Ok(exit_for_alerts(&alerts, fail_on_regression))
        }

        Commands::History { suite, name, store } => {
            let view = View::open(&open_storage(store)?)?;
            for point in view.history(&suite, &name) {
                let range = point.range.map(|r| r.to_string()).unwrap_or_default();
                println!("{}\t{}\t{}", point.date, point.value, range);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Suites { store } => {
            let view = View::open(&open_storage(store)?)?;
            let updated = DateTime::from_timestamp_millis(view.last_update())
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!("# {} (updated {updated}, version {})", view.repo_url(), view.version());
            for suite in view.suites() {
                println!(
                    "{suite}\t{} entries\t{} measurements",
                    view.entries(suite).len(),
                    view.measurement_names(suite).len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_storage(args: StoreArgs) -> Result<Storage> {
    let path = cli::resolve_store(args.store).map_err(|e| anyhow!(e))?;
    Ok(Storage::new(path))
}

fn read_commit(path: &Path) -> Result<Commit> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read commit file: {path:?}"))?;
    let commit: Commit = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse commit file: {path:?}"))?;
    if commit.id().trim().is_empty() {
        return Err(anyhow!("commit file {path:?} has an empty id"));
    }
    Ok(commit)
}

fn print_alerts(alerts: &[RegressionAlert]) {
    for alert in alerts {
        println!("regression: {alert}");
    }
}

fn exit_for_alerts(alerts: &[RegressionAlert], fail_on_regression: bool) -> ExitCode {
    if fail_on_regression && !alerts.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
