//! Notification sinks for the error a run ends with.

use async_trait::async_trait;
use failfast_core::{RunId, SupervisorError};
use tracing::error;

/// Receives the single error a failed run reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report the error of a failed run.
    async fn notify(&self, run_id: &RunId, error: &SupervisorError);
}

/// Logs run errors through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, run_id: &RunId, err: &SupervisorError) {
        match err {
            SupervisorError::WorkerFailure {
                worker,
                failure,
                cancelled,
            } => {
                error!(
                    run_id = %run_id,
                    worker = %worker,
                    kind = %failure.kind,
                    cancelled = ?cancelled,
                    "Run failed: {}\n{}",
                    failure.message,
                    failure.trace
                );
            }
            other => {
                error!(run_id = %run_id, worker = ?other.worker(), "Run failed: {}", other);
            }
        }
    }
}
