use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The document store could not be reached or read; aborts the whole pass
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Writing one sheet to the sink failed; only that sheet is affected
    #[error("Sink write failed for table {table}: {message}")]
    SinkWriteFailure { table: String, message: String },

    #[error("Failed to persist {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("Sync pass timed out after {0} seconds")]
    Timeout(u64),

    #[error("A sync pass is already in progress")]
    PassInProgress,
}

impl SyncError {
    pub(crate) fn persistence(path: &Path, message: impl ToString) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
