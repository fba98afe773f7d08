//! Data layer for the benchmark history document.
//!
//! Models, the append-only per-suite history, and on-disk storage.

pub mod history;
mod models;
mod storage;

pub use history::{HistoryPoint, HistoryStore};
pub use models::{Commit, Direction, Entry, Measurement, Tool};
pub use storage::{CasOutcome, Storage, Version};
