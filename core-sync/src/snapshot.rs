//! Durable sync state
//!
//! Two small JSON files live in the state directory:
//!
//! - the snapshot (`{"sheet": {"0": "<sha256 hex>", ...}}`), the record of
//!   what the sink currently holds for every sheet;
//! - the checkpoints (`{"sheet": "<change token>"}`), the last source token
//!   each sheet was successfully synced at.
//!
//! Both are replaced atomically on every write. A file that cannot be read or
//! parsed is treated as empty: the affected sheets are fully re-synced, which
//! is safe because sink writes are idempotent.

use crate::error::{Result, SyncError};
use crate::fingerprint::SheetFingerprints;
use bridge_traits::source::ChangeToken;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Replace `path` with `content` via a temp file in the same directory.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SyncError::persistence(parent, e))?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| SyncError::persistence(&temp_path, e))?;

    temp_file
        .write_all(content)
        .map_err(|e| SyncError::persistence(&temp_path, e))?;
    temp_file
        .sync_all()
        .map_err(|e| SyncError::persistence(&temp_path, e))?;
    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        SyncError::persistence(path, e)
    })
}

fn load_or_empty<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No {} file yet, starting empty", what);
            return T::default();
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Unreadable {} file, treating as empty; affected sheets will be fully re-synced",
                what
            );
            return T::default();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(
            path = %path.display(),
            error = %e,
            "Corrupt {} file, treating as empty; affected sheets will be fully re-synced",
            what
        );
        T::default()
    })
}

fn persist_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value).map_err(|e| SyncError::persistence(path, e))?;
    write_atomic(path, &content)
}

/// Per-sheet row fingerprints of the last committed write.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    sheets: BTreeMap<String, SheetFingerprints>,
}

impl SnapshotStore {
    /// Load the snapshot at `path`, or start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sheets = load_or_empty(&path, "snapshot");
        Self { path, sheets }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetFingerprints> {
        self.sheets.get(name)
    }

    /// Replace a sheet's fingerprints and persist immediately. Call only after
    /// the sink write succeeded.
    ///
    /// The in-memory snapshot is left unchanged if persisting fails.
    pub fn commit(&mut self, name: &str, fingerprints: SheetFingerprints) -> Result<()> {
        let previous = self.sheets.insert(name.to_string(), fingerprints);

        if let Err(e) = self.persist() {
            match previous {
                Some(previous) => self.sheets.insert(name.to_string(), previous),
                None => self.sheets.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        persist_json(&self.path, &self.sheets)?;
        debug!(path = %self.path.display(), sheets = self.sheets.len(), "Persisted snapshot");
        Ok(())
    }
}

/// Last synced change token per sheet.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    tokens: BTreeMap<String, ChangeToken>,
}

impl CheckpointStore {
    /// Load the checkpoints at `path`, or start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = load_or_empty(&path, "checkpoint");
        Self { path, tokens }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sheet's checkpoint, or the epoch token if it was never synced.
    pub fn get(&self, name: &str) -> ChangeToken {
        self.tokens.get(name).cloned().unwrap_or_default()
    }

    /// Record `token` for the sheet and persist immediately.
    ///
    /// The in-memory value is left unchanged if persisting fails.
    pub fn advance(&mut self, name: &str, token: ChangeToken) -> Result<()> {
        let previous = self.tokens.insert(name.to_string(), token);

        if let Err(e) = persist_json(&self.path, &self.tokens) {
            match previous {
                Some(previous) => self.tokens.insert(name.to_string(), previous),
                None => self.tokens.remove(name),
            };
            return Err(e);
        }

        debug!(sheet = name, path = %self.path.display(), "Advanced checkpoint");
        Ok(())
    }
}
