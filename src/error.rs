//! Error types for ingestion, storage and regression evaluation.

use std::path::PathBuf;

use crate::data::Direction;

/// Everything that can go wrong while turning a benchmark run into history.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Tool output could not be parsed. Nothing is emitted for the run.
    #[error("failed to parse {tool} output at byte {offset}: {reason}")]
    Parse {
        tool: String,
        offset: usize,
        reason: String,
    },

    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    /// A parsed measurement failed validation.
    #[error("invalid measurement {name:?}: {reason}")]
    InvalidMeasurement { name: String, reason: String },

    /// The suite already holds an entry for this commit and date.
    #[error("suite {suite:?} already has an entry for commit {commit} at {date}")]
    Conflict {
        suite: String,
        commit: String,
        date: i64,
    },

    /// Compare-and-swap kept losing against concurrent writers.
    #[error("document changed concurrently; gave up after {attempts} attempts")]
    MergeConflict { attempts: u32 },

    #[error("measurement {name:?} in suite {suite:?} was {previous} but is now {current}")]
    SchemaViolation {
        suite: String,
        name: String,
        previous: Direction,
        current: Direction,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(tool: &str, offset: usize, reason: impl Into<String>) -> Self {
        BenchError::Parse {
            tool: tool.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::MergeConflict { .. } => 2,
            _ => 1,
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
