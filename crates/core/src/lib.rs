//! failfast core data models.
//!
//! This crate defines the types shared between supervised workers and the
//! coordinator that runs them: identities, work items, exit reports and the
//! error taxonomy.

#![warn(missing_docs)]

// Identities
mod id;

// Work description
mod work;

// Outcome reporting
mod failure;
mod state;

// Errors
mod error;

// Re-exports
pub use id::*;

pub use work::{Task, WorkItem};
pub use failure::{ExitReport, FailureKind, FailureRecord};
pub use state::WorkerState;
pub use error::{Result, SupervisorError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Result payload produced by a successful work item.
pub type Payload = serde_json::Value;
