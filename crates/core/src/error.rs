//! Error taxonomy for supervised runs.

use crate::{FailureRecord, WorkerId};

/// Error type for supervision operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// The single error surface of a supervised run.
///
/// Worker-internal errors never appear here directly; they arrive as a
/// [`FailureRecord`] and are wrapped in [`SupervisorError::WorkerFailure`].
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// An isolated context could not be created. Aborts the run immediately.
    #[error("failed to start worker {worker}: {reason}")]
    Bootstrap {
        /// Worker whose context could not be launched
        worker: WorkerId,
        /// Why the isolation primitive refused
        reason: String,
    },

    /// The first failure observed in a run, with its diagnostic trace.
    #[error("worker {worker} failed:\n{}", .failure.trace)]
    WorkerFailure {
        /// Origin of the failure
        worker: WorkerId,
        /// What the worker reported
        failure: FailureRecord,
        /// Siblings that were cancelled; their outcome is unknown
        cancelled: Vec<WorkerId>,
    },

    /// A fault in the coordinator's own logic.
    #[error("orchestration error: {0}")]
    Orchestration(String),
}

impl SupervisorError {
    /// Worker the error originated from, if any.
    pub fn worker(&self) -> Option<&WorkerId> {
        match self {
            SupervisorError::Bootstrap { worker, .. } => Some(worker),
            SupervisorError::WorkerFailure { worker, .. } => Some(worker),
            SupervisorError::Orchestration(_) => None,
        }
    }

    /// The worker failure record, if this error wraps one.
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            SupervisorError::WorkerFailure { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Whether this error aborted the run before any polling started.
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, SupervisorError::Bootstrap { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_display_carries_trace() {
        let failure = FailureRecord::from_error(&anyhow::anyhow!("bad input"));
        let err = SupervisorError::WorkerFailure {
            worker: WorkerId::from("worker1"),
            failure,
            cancelled: vec![WorkerId::from("worker2")],
        };
        let text = err.to_string();
        assert!(text.starts_with("worker worker1 failed:"));
        assert!(text.contains("bad input"));
        assert_eq!(err.worker().map(|w| w.as_str()), Some("worker1"));
        assert!(err.failure().is_some());
    }

    #[test]
    fn test_bootstrap_error() {
        let err = SupervisorError::Bootstrap {
            worker: WorkerId::from("worker2"),
            reason: "no runtime".to_string(),
        };
        assert!(err.is_bootstrap());
        assert_eq!(err.to_string(), "failed to start worker worker2: no runtime");
        assert!(err.failure().is_none());
    }

    #[test]
    fn test_orchestration_error_has_no_origin() {
        let err = SupervisorError::Orchestration("duplicate worker".to_string());
        assert!(err.worker().is_none());
        assert!(!err.is_bootstrap());
    }
}
