//! Exit reports written by a worker's isolated context.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::Backtrace;

use crate::Time;

/// How a work item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The work item returned an error
    Error,
    /// The work item panicked
    Panic,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Error => write!(f, "error"),
            FailureKind::Panic => write!(f, "panic"),
        }
    }
}

/// An error raised inside a worker, copied out of its isolated context.
///
/// The trace is rendered once, inside the isolated context, at the moment the
/// failure is observed there. It is never regenerated on the supervisor side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Error or panic
    pub kind: FailureKind,
    /// Top-level error message
    pub message: String,
    /// Formatted diagnostic trace (cause chain and backtrace when available)
    pub trace: String,
    /// When the failure was recorded
    pub failed_at: Time,
}

impl FailureRecord {
    /// Record an error returned by a work item.
    ///
    /// The trace is the error's debug rendering: the full cause chain, plus
    /// the stack backtrace `anyhow` captured when the error was created. That
    /// stack is only present when `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE`
    /// enabled capture; otherwise the trace is the cause chain alone.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Error,
            message: error.to_string(),
            trace: format!("Error: {:?}", error),
            failed_at: chrono::Utc::now(),
        }
    }

    /// Record a panic payload caught around a work item.
    ///
    /// `backtrace` should be the stack captured at the panic site (by a panic
    /// hook); once the panic has unwound to the catch site it cannot be
    /// recovered, so without one the trace says so instead of faking it.
    pub fn from_panic(payload: Box<dyn Any + Send>, backtrace: Option<Backtrace>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        let trace = match backtrace {
            Some(backtrace) => format!("panicked: {}\n\nStack backtrace:\n{}", message, backtrace),
            None => format!("panicked: {}\n\n(panic-site backtrace unavailable)", message),
        };

        Self {
            kind: FailureKind::Panic,
            message,
            trace,
            failed_at: chrono::Utc::now(),
        }
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// The single report a worker's isolated context writes before it exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitReport {
    /// Success marker. Carries nothing; the payload goes to the result mailbox.
    Success,
    /// The work item failed
    Failure(FailureRecord),
}

impl ExitReport {
    /// The failure record, if this report is a failure.
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            ExitReport::Success => None,
            ExitReport::Failure(record) => Some(record),
        }
    }

    /// Whether this is the success marker.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitReport::Success)
    }
}
