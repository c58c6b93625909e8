//! Supervised workers.
//!
//! A [`SupervisedWorker`] runs one [`WorkItem`](failfast_core::WorkItem) inside
//! an isolated execution context and makes its outcome observable to a
//! supervisor that shares no memory with it:
//!
//! - **Isolation**: the [`Isolation`] trait launches contexts; [`TaskIsolation`]
//!   uses Tokio tasks, [`ThreadIsolation`] dedicated OS threads
//! - **Exit report**: written exactly once by the context before it exits
//! - **Result mailbox**: receives the payload of a successful work item
//! - **Panic hook**: keeps the panic-site backtrace for the failure record
//!
//! # Flow
//!
//! 1. [`mailbox`] creates the result channel; the sender goes to the worker
//! 2. [`SupervisedWorker::start`] launches the context
//! 3. The supervisor polls [`SupervisedWorker::poll_failure`] and
//!    [`SupervisedWorker::is_alive`]
//! 4. On a sibling failure it calls [`SupervisedWorker::cancel`]; otherwise it
//!    joins and drains the [`ResultReceiver`]

#![warn(missing_docs)]

pub mod isolation;
pub mod mailbox;
pub mod panic;
pub mod supervised;

pub use isolation::{Isolation, IsolationHandle, Job, TaskIsolation, ThreadIsolation};
pub use mailbox::{mailbox, ResultReceiver, ResultSender};
pub use panic::{install_hook, take_backtrace};
pub use supervised::SupervisedWorker;
