//! # Incremental Sync Module
//!
//! Keeps SQLite sink tables in step with the sheets of a remote workbook,
//! writing only the rows that changed since the last successful pass.
//!
//! ## Components
//!
//! - **Fingerprints** (`fingerprint`): SHA-256 digest per row over a
//!   type-tagged, length-prefixed encoding
//! - **Diff** (`diff`): added / changed / removed row indices against the
//!   last committed snapshot
//! - **State** (`snapshot`): snapshot and checkpoint files, replaced atomically
//! - **Orchestrator** (`orchestrator`): one pass over all sheets, see
//!   [`SyncOrchestrator::run_pass`]
//! - **Scheduler** (`scheduler`): non-overlapping passes on a fixed interval
//!   with a per-pass timeout
//!
//! ## Row identity
//!
//! A row is identified by its position in the normalized sheet, not by a
//! business key. Inserting or deleting a row in the middle of a sheet
//! therefore reports every following row as changed (and the tail as added or
//! removed). The sink ends up correct either way; the cost is extra writes.
//!
//! Rows written or deleted directly in the sink by other clients are not
//! reconciled: the snapshot only records what this engine last wrote.

pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod orchestrator;
pub mod scheduler;
pub mod snapshot;

pub use diff::{diff_fingerprints, diff_table, RowDiff};
pub use error::{Result, SyncError};
pub use fingerprint::{fingerprint_row, fingerprint_table, SheetFingerprints};
pub use orchestrator::{PassReport, SheetOutcome, SheetReport, SyncOrchestrator};
pub use scheduler::SyncScheduler;
pub use snapshot::{write_atomic, CheckpointStore, SnapshotStore};
