//! Built-in work items.

#![warn(missing_docs)]

pub mod builtin;
pub mod spec;

pub use builtin::{CommandTask, DelayedTask, FailTask, PanicTask, StaticTask};
pub use spec::TaskSpec;
