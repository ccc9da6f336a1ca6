//! Periodic sync passes.

use crate::error::{Result, SyncError};
use crate::orchestrator::{PassReport, SyncOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a pass immediately and then on every interval tick until cancelled.
///
/// Ticks that fall due while a pass is running are dropped, so passes never
/// overlap. Each pass is bounded by `pass_timeout`; dropping a timed-out pass
/// rolls back whatever sink transaction it had open.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    pass_timeout: Duration,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration, pass_timeout: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            pass_timeout,
        }
    }

    /// One pass, bounded by the pass timeout.
    pub async fn run_once(&self) -> Result<PassReport> {
        match timeout(self.pass_timeout, self.orchestrator.run_pass()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout_secs = self.pass_timeout.as_secs(),
                    "Sync pass timed out, treating as whole-pass failure"
                );
                Err(SyncError::Timeout(self.pass_timeout.as_secs()))
            }
        }
    }

    /// Loop until `cancel` fires. An in-flight pass is abandoned on cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            pass_timeout_secs = self.pass_timeout.as_secs(),
            "Sync scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Shutdown requested during a sync pass, abandoning it");
                    break;
                }
                result = self.run_once() => match result {
                    Ok(report) if report.has_failures() => {
                        warn!(failed = report.failed(), "Sync pass finished with failed sheets");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Sync pass failed, retrying next tick"),
                },
            }
        }

        info!("Sync scheduler stopped");
    }
}
