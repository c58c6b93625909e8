//! Coordination layer - runs supervised workers to completion or to the
//! first failure.

#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod notify;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, RunResults};
pub use notify::{Notifier, TracingNotifier};
