//! On-disk storage for the history document.
//!
//! The document lives in a single file, either plain JSON (`data.json`) or
//! the script form loaded by the dashboard (`data.js`):
//! `window.BENCHMARK_DATA = {...}`.
//!
//! Writers use compare-and-swap: a load hands out a version token (hash of
//! the bytes read), and a write only lands if the file still hashes to that
//! token. The compare and the replace run under a short-lived lock file, and
//! the replace itself is a temp-file write followed by an atomic rename, so
//! readers never observe a partial document.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::models::Document;
use crate::error::{BenchError, BenchResult};

const SCRIPT_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// A lock older than this is assumed to belong to a crashed writer
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// How the document is framed on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    /// JSON assigned to `window.BENCHMARK_DATA`
    Script,
}

impl Format {
    /// `.js` files get the script framing, everything else is plain JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js") => Format::Script,
            _ => Format::Json,
        }
    }
}

/// Identifies the exact bytes a document was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(Option<blake3::Hash>);

impl Version {
    /// Token for a store that has never been written
    pub fn absent() -> Self {
        Version(None)
    }

    fn of(bytes: &[u8]) -> Self {
        Version(Some(blake3::hash(bytes)))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(hash) => write!(f, "{}", &hash.to_hex().as_str()[..12]),
            None => write!(f, "absent"),
        }
    }
}

/// A document together with the version it was read at
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: Document,
    pub version: Version,
}

/// Result of a compare-and-swap attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Written(Version),
    /// Someone else wrote (or is writing) first; nothing was changed
    Stale,
}

/// File-backed document store
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
    format: Format,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        let format = Format::from_path(&path);
        Storage { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the current document. A missing file is an empty document.
    pub fn load(&self) -> BenchResult<Snapshot> {
        match self.read_bytes()? {
            Some(bytes) => Ok(Snapshot {
                document: decode(&bytes)?,
                version: Version::of(&bytes),
            }),
            None => Ok(Snapshot {
                document: Document::default(),
                version: Version::absent(),
            }),
        }
    }

    fn read_bytes(&self) -> BenchResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BenchError::io(&self.path, e)),
        }
    }

    /// Replace the stored document if it is still at `expected`.
    pub fn compare_and_swap(
        &self,
        expected: &Version,
        document: &Document,
    ) -> BenchResult<CasOutcome> {
        let bytes = encode(document, self.format)?;

        let Some(_lock) = self.try_lock()? else {
            debug!(path = ?self.path, "Store is locked by another writer");
            return Ok(CasOutcome::Stale);
        };

        let current = match self.read_bytes()? {
            Some(existing) => Version::of(&existing),
            None => Version::absent(),
        };
        if &current != expected {
            debug!(%expected, %current, "Store version moved");
            return Ok(CasOutcome::Stale);
        }

        self.write_atomic(&bytes)?;
        Ok(CasOutcome::Written(Version::of(&bytes)))
    }

    fn write_atomic(&self, bytes: &[u8]) -> BenchResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| BenchError::io(&dir, e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| BenchError::io(&dir, e))?;
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| BenchError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| BenchError::io(&self.path, e.error))?;
        Ok(())
    }

    fn try_lock(&self) -> BenchResult<Option<LockGuard>> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }

        for _ in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Some(LockGuard { path: lock_path })),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !is_stale(&lock_path) {
                        return Ok(None);
                    }
                    warn!(path = ?lock_path, "Removing abandoned lock file");
                    match fs::remove_file(&lock_path) {
                        Ok(()) => continue,
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(BenchError::io(&lock_path, e)),
                    }
                }
                Err(e) => return Err(BenchError::io(&lock_path, e)),
            }
        }
        Ok(None)
    }
}

fn is_stale(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}

/// Removes the lock file when the critical section ends
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = ?self.path, "Failed to release lock: {e}");
        }
    }
}

/// Parse either framing. Bytes that are not valid UTF-8 are an error.
pub fn decode(bytes: &[u8]) -> BenchResult<Document> {
    let body = bytes.trim_ascii_start();
    let body = body.strip_prefix(SCRIPT_PREFIX.as_bytes()).unwrap_or(body);
    let mut body = body.trim_ascii_end();
    while let Some(rest) = body.strip_suffix(b";") {
        body = rest;
    }
    Ok(serde_json::from_slice(body)?)
}

/// Serialize with two-space indentation, preserving suite and entry order
pub fn encode(document: &Document, format: Format) -> BenchResult<Vec<u8>> {
    let json = serde_json::to_string_pretty(document)?;
    let text = match format {
        Format::Json => json,
        Format::Script => format!("{SCRIPT_PREFIX}{json}"),
    };
    Ok(text.into_bytes())
}
