//! A work item running in an isolated context, observed from outside.

use failfast_core::{
    ExitReport, FailureRecord, Result, SupervisorError, WorkItem, WorkerId, WorkerState,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn, Instrument};

use crate::isolation::{Isolation, IsolationHandle, Job};
use crate::mailbox::ResultSender;
use crate::panic;

/// Wraps one work item and makes its outcome observable to a supervisor.
///
/// The isolated context writes exactly one [`ExitReport`] before it exits:
/// the success marker after delivering the payload to the result mailbox, or
/// a [`FailureRecord`] when the work item errors or panics. Failures are never
/// re-raised across the boundary; the report is the only source of truth.
pub struct SupervisedWorker {
    id: WorkerId,
    isolation: Arc<dyn Isolation>,
    pending: Option<(WorkItem, ResultSender)>,
    handle: Option<Box<dyn IsolationHandle>>,
    reports: Option<oneshot::Receiver<ExitReport>>,
    report: Option<ExitReport>,
    state: WorkerState,
    cancel_requested: bool,
}

impl SupervisedWorker {
    /// Create a worker. Nothing runs until [`start`](Self::start).
    pub fn new(
        id: impl Into<WorkerId>,
        item: WorkItem,
        results: ResultSender,
        isolation: Arc<dyn Isolation>,
    ) -> Self {
        Self {
            id: id.into(),
            isolation,
            pending: Some((item, results)),
            handle: None,
            reports: None,
            report: None,
            state: WorkerState::Constructed,
            cancel_requested: false,
        }
    }

    /// Worker identity.
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Current lifecycle state, as last observed.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Launch the isolated context.
    ///
    /// Fails only if the isolation primitive cannot create the context, or if
    /// the worker was already started.
    pub fn start(&mut self) -> Result<()> {
        let Some((item, results)) = self.pending.take() else {
            return Err(SupervisorError::Orchestration(format!(
                "worker {} already started",
                self.id
            )));
        };

        panic::install_hook();
        let (report_tx, report_rx) = oneshot::channel();
        let job = Self::job(self.id.clone(), item, results, report_tx);

        let handle = self.isolation.launch(&self.id, job)?;
        self.handle = Some(handle);
        self.reports = Some(report_rx);
        self.state = WorkerState::Running;

        info!(worker = %self.id, "Worker started");
        Ok(())
    }

    /// The body of the isolated context.
    fn job(
        id: WorkerId,
        item: WorkItem,
        results: ResultSender,
        reports: oneshot::Sender<ExitReport>,
    ) -> Job {
        let span = tracing::info_span!("worker", worker = %id, task = %item.name());

        async move {
            let outcome = AssertUnwindSafe(item.run()).catch_unwind().await;

            let report = match outcome {
                Ok(Ok(payload)) => {
                    if !results.deliver(payload) {
                        debug!("Result mailbox closed, payload dropped");
                    }
                    ExitReport::Success
                }
                Ok(Err(error)) => {
                    warn!(error = %error, "Work item failed");
                    ExitReport::Failure(FailureRecord::from_error(&error))
                }
                Err(payload) => {
                    let record = FailureRecord::from_panic(payload, panic::take_backtrace());
                    warn!(error = %record.message, "Work item panicked");
                    ExitReport::Failure(record)
                }
            };

            // Written last: once the context is gone, the report is visible.
            let _ = reports.send(report);
        }
        .instrument(span)
        .boxed()
    }

    /// Non-blocking read of the exit report.
    ///
    /// The report channel is read at most once; later calls return the cached
    /// copy. Returns `None` while nothing has arrived, and forever if the
    /// context exited without writing a report (e.g. it was cancelled).
    pub fn poll_outcome(&mut self) -> Option<&ExitReport> {
        if self.report.is_none() {
            if let Some(reports) = self.reports.as_mut() {
                match reports.try_recv() {
                    Ok(report) => {
                        self.reports = None;
                        if !self.state.is_terminal() {
                            self.state = if report.is_success() {
                                WorkerState::CompletedOk
                            } else {
                                WorkerState::CompletedFailed
                            };
                        }
                        debug!(worker = %self.id, state = %self.state, "Exit report received");
                        self.report = Some(report);
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Closed) => {
                        debug!(worker = %self.id, "Context exited without an exit report");
                        self.reports = None;
                    }
                }
            }
        }

        self.report.as_ref()
    }

    /// Non-blocking read of the failure record, with the same caching rules
    /// as [`poll_outcome`](Self::poll_outcome).
    pub fn poll_failure(&mut self) -> Option<&FailureRecord> {
        self.poll_outcome().and_then(ExitReport::failure)
    }

    /// True while the isolated context has not exited.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_alive())
    }

    /// Request termination of the isolated context.
    ///
    /// Best-effort and not awaited. Only the first call reaches the isolation
    /// primitive. Returns whether this call issued the request.
    pub fn cancel(&mut self) -> bool {
        if self.cancel_requested {
            return false;
        }
        let Some(handle) = self.handle.as_ref() else {
            return false;
        };

        handle.cancel();
        self.cancel_requested = true;
        if !self.state.is_terminal() {
            self.state = WorkerState::Cancelled;
        }

        info!(worker = %self.id, "Cancel requested");
        true
    }

    /// Wait up to `timeout` for the isolated context to exit.
    pub async fn join(&mut self, timeout: Duration) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(SupervisorError::Orchestration(format!(
                "worker {} was never started",
                self.id
            )));
        };

        if handle.wait(timeout).await {
            Ok(())
        } else {
            Err(SupervisorError::Orchestration(format!(
                "worker {} did not exit within {:?}",
                self.id, timeout
            )))
        }
    }
}

impl std::fmt::Debug for SupervisedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedWorker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("report", &self.report)
            .finish()
    }
}
