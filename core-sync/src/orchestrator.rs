//! # Sync Orchestrator
//!
//! Drives one pass over every configured sheet of a workbook.
//!
//! ## Workflow
//!
//! 1. Fetch the workbook's change token. Failure aborts the pass.
//! 2. Skip sheets whose checkpoint is not older than the token.
//! 3. Read every remaining sheet. Any read failure aborts the pass before
//!    anything is written.
//! 4. Per sheet: diff against the snapshot; if nothing changed, leave the
//!    sheet alone (the checkpoint is not advanced either).
//! 5. Otherwise ensure the sink table, upsert added and changed rows, delete
//!    removed rows. A sink failure fails only this sheet.
//! 6. Commit and persist the sheet's snapshot, then advance its checkpoint.
//!
//! A crash between steps 5 and 6 repeats the same writes next pass, which the
//! sink applies idempotently.

use crate::diff::{diff_table, RowDiff};
use crate::error::{Result, SyncError};
use crate::fingerprint::SheetFingerprints;
use crate::snapshot::{CheckpointStore, SnapshotStore};
use bridge_traits::source::{ChangeToken, DocumentRef, DocumentSource, SheetSchema};
use bridge_traits::table::Table;
use core_library::SinkWriter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// What happened to one sheet during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetOutcome {
    /// The source has not changed since `token`, the sheet's checkpoint
    Skipped { token: ChangeToken },
    /// The source changed but the rows did not
    Unchanged,
    Synced {
        added: usize,
        changed: usize,
        removed: usize,
    },
    /// Writing to the sink failed; snapshot and checkpoint were left as they were
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReport {
    pub sheet: String,
    pub table: String,
    pub outcome: SheetOutcome,
}

/// Result of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Change token observed at the start of the pass
    pub token: ChangeToken,
    /// One entry per configured sheet, in configuration order
    pub sheets: Vec<SheetReport>,
}

impl PassReport {
    pub fn outcome(&self, sheet: &str) -> Option<&SheetOutcome> {
        self.sheets
            .iter()
            .find(|report| report.sheet == sheet)
            .map(|report| &report.outcome)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SheetOutcome::Failed { .. }))
    }

    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, SheetOutcome::Synced { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SheetOutcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, predicate: impl Fn(&SheetOutcome) -> bool) -> usize {
        self.sheets.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

struct SyncState {
    snapshots: SnapshotStore,
    checkpoints: CheckpointStore,
}

/// Incremental sync of one workbook's sheets into the sink
pub struct SyncOrchestrator {
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn SinkWriter>,
    document: DocumentRef,
    sheets: Vec<SheetSchema>,
    /// Held for the duration of a pass; passes never overlap.
    state: Mutex<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn SinkWriter>,
        document: DocumentRef,
        sheets: Vec<SheetSchema>,
        snapshots: SnapshotStore,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            source,
            sink,
            document,
            sheets,
            state: Mutex::new(SyncState {
                snapshots,
                checkpoints,
            }),
        }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn sheets(&self) -> &[SheetSchema] {
        &self.sheets
    }

    /// Run one sync pass.
    ///
    /// # Errors
    ///
    /// - [`SyncError::PassInProgress`] if another pass is running
    /// - [`SyncError::SourceUnavailable`] if the token or any sheet could not
    ///   be read; nothing was written
    /// - [`SyncError::Persistence`] if the final snapshot write failed
    ///
    /// Per-sheet sink failures are reported in the [`PassReport`], not as errors.
    #[instrument(skip(self), fields(file = %self.document.file_name))]
    pub async fn run_pass(&self) -> Result<PassReport> {
        let mut state = self.state.try_lock().map_err(|_| {
            warn!("Sync pass requested while another pass is running");
            SyncError::PassInProgress
        })?;

        let token = self
            .source
            .fetch_change_token(&self.document)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch change token, aborting pass");
                SyncError::SourceUnavailable(e.to_string())
            })?;

        info!(token = %token, sheets = self.sheets.len(), "Starting sync pass");

        let mut outcomes: Vec<Option<SheetOutcome>> = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            let checkpoint = state.checkpoints.get(&sheet.name);
            if token.is_newer_than(&checkpoint) {
                outcomes.push(None);
            } else {
                info!(sheet = %sheet.name, checkpoint = %checkpoint, "Source unchanged, skipping sheet");
                outcomes.push(Some(SheetOutcome::Skipped { token: checkpoint }));
            }
        }

        let mut tables: Vec<Option<Table>> = Vec::with_capacity(self.sheets.len());
        for (sheet, outcome) in self.sheets.iter().zip(&outcomes) {
            if outcome.is_some() {
                tables.push(None);
                continue;
            }

            let table = self
                .source
                .read_table(&self.document, sheet)
                .await
                .map_err(|e| {
                    error!(sheet = %sheet.name, error = %e, "Failed to read sheet, aborting pass");
                    SyncError::SourceUnavailable(e.to_string())
                })?;
            tables.push(Some(table));
        }

        let mut reports = Vec::with_capacity(self.sheets.len());
        for ((sheet, outcome), table) in self.sheets.iter().zip(outcomes).zip(tables) {
            let outcome = match (outcome, table) {
                (Some(skipped), _) => skipped,
                (None, Some(table)) => self.sync_sheet(&mut state, sheet, &table, &token).await,
                (None, None) => continue,
            };

            reports.push(SheetReport {
                sheet: sheet.name.clone(),
                table: sheet.table_name.clone(),
                outcome,
            });
        }

        state.snapshots.persist().map_err(|e| {
            error!(error = %e, "Failed to persist snapshot at end of pass");
            e
        })?;

        let report = PassReport {
            token,
            sheets: reports,
        };

        info!(
            synced = report.synced(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Sync pass complete"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(sheet = %sheet.name, table = %sheet.table_name))]
    async fn sync_sheet(
        &self,
        state: &mut SyncState,
        sheet: &SheetSchema,
        table: &Table,
        token: &ChangeToken,
    ) -> SheetOutcome {
        let empty = SheetFingerprints::new();
        let previous = state.snapshots.sheet(&sheet.name).unwrap_or(&empty);
        let diff = diff_table(previous, table);

        if diff.is_empty() {
            info!(rows = table.len(), "No row changes");
            return SheetOutcome::Unchanged;
        }

        info!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "Detected row changes"
        );

        if let Err(e) = self.write(sheet, table, &diff).await {
            error!(error = %e, "Sink write failed, snapshot not advanced");
            return SheetOutcome::Failed {
                error: e.to_string(),
            };
        }

        let outcome = SheetOutcome::Synced {
            added: diff.added.len(),
            changed: diff.changed.len(),
            removed: diff.removed.len(),
        };

        if let Err(e) = state.snapshots.commit(&sheet.name, diff.current) {
            error!(error = %e, "Failed to persist snapshot, checkpoint not advanced");
            return SheetOutcome::Failed {
                error: e.to_string(),
            };
        }

        if let Err(e) = state.checkpoints.advance(&sheet.name, token.clone()) {
            error!(error = %e, "Failed to persist checkpoint");
            return SheetOutcome::Failed {
                error: e.to_string(),
            };
        }

        outcome
    }

    async fn write(&self, sheet: &SheetSchema, table: &Table, diff: &RowDiff) -> Result<()> {
        let sink_error = |e: core_library::LibraryError| SyncError::SinkWriteFailure {
            table: sheet.table_name.clone(),
            message: e.to_string(),
        };

        self.sink
            .ensure_table(&sheet.table_name, table.columns())
            .await
            .map_err(sink_error)?;

        let rows = table.select(&diff.upsert_indices());
        self.sink
            .upsert(&sheet.table_name, table.columns(), &rows)
            .await
            .map_err(sink_error)?;

        self.sink
            .delete(&sheet.table_name, &diff.removed)
            .await
            .map_err(sink_error)?;

        Ok(())
    }
}
