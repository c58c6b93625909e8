//! Worker lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a supervised worker.
///
/// ```text
/// Constructed -> Running -> CompletedOk | CompletedFailed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Not yet started
    Constructed,
    /// Isolated context launched
    Running,
    /// Success marker observed
    CompletedOk,
    /// Failure record observed
    CompletedFailed,
    /// Cancel requested before an outcome was observed. Outcome unknown:
    /// neither success nor failure.
    Cancelled,
}

impl WorkerState {
    /// Whether the worker has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::CompletedOk | WorkerState::CompletedFailed | WorkerState::Cancelled
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Constructed => write!(f, "constructed"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::CompletedOk => write!(f, "completed-ok"),
            WorkerState::CompletedFailed => write!(f, "completed-failed"),
            WorkerState::Cancelled => write!(f, "cancelled"),
        }
    }
}
