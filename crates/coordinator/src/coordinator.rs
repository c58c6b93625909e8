//! The coordinator - starts all workers, polls them, and fails fast.

use failfast_core::{
    ExitReport, FailureRecord, Payload, Result, RunId, SupervisorError, WorkItem, WorkerId,
};
use failfast_worker::{mailbox, take_backtrace, Isolation, ResultReceiver, SupervisedWorker};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::{CoordinatorConfig, Notifier, TracingNotifier};

/// Results of a fully successful run, keyed by worker identity.
pub type RunResults = BTreeMap<WorkerId, Payload>;

struct Entry {
    worker: SupervisedWorker,
    results: ResultReceiver,
}

/// Runs a fixed set of supervised workers concurrently.
///
/// Single use: [`run`](Self::run) consumes the coordinator. The run either
/// returns every worker's result, or exactly one error:
///
/// ```text
/// start all -> poll every interval -> first failure: cancel siblings, raise
///                                  -> all exited:    join, drain results
/// ```
pub struct Coordinator {
    config: CoordinatorConfig,
    entries: Vec<Entry>,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    /// Create a coordinator with no workers.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Set the sink that receives the error of a failed run.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Add a worker together with the read half of its result mailbox.
    ///
    /// Workers are polled in the order they were added. Ids must be unique;
    /// a duplicate fails [`run`](Self::run) before any worker starts.
    pub fn add(&mut self, worker: SupervisedWorker, results: ResultReceiver) {
        self.entries.push(Entry { worker, results });
    }

    /// Build a worker for `item` with a fresh mailbox and add it.
    pub fn add_work(
        &mut self,
        id: impl Into<WorkerId>,
        item: WorkItem,
        isolation: Arc<dyn Isolation>,
    ) {
        let (tx, rx) = mailbox();
        self.add(SupervisedWorker::new(id, item, tx, isolation), rx)
    }

    /// Number of workers added.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no workers were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every worker to completion or to the first failure.
    pub async fn run(self) -> Result<RunResults> {
        let run_id = RunId::new();
        let span = tracing::info_span!("run", run_id = %run_id, workers = self.entries.len());
        let notifier = self.notifier.clone();

        let outcome = async {
            match AssertUnwindSafe(self.supervise()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let record = FailureRecord::from_panic(panic, take_backtrace());
                    Err(SupervisorError::Orchestration(format!(
                        "coordinator panicked: {}",
                        record.message
                    )))
                }
            }
        }
        .instrument(span)
        .await;

        if let Err(e) = &outcome {
            notifier.notify(&run_id, e).await;
        }
        outcome
    }

    async fn supervise(self) -> Result<RunResults> {
        let Coordinator {
            config,
            mut entries,
            ..
        } = self;

        Self::check_ids(&entries)?;
        Self::start_all(&mut entries)?;
        info!("Started {} workers", entries.len());

        loop {
            // Snapshot liveness first: an exited worker's report is already
            // visible to the polls below.
            let all_exited = entries.iter().all(|e| !e.worker.is_alive());

            let origin = entries.iter_mut().enumerate().find_map(|(index, entry)| {
                entry
                    .worker
                    .poll_failure()
                    .cloned()
                    .map(|failure| (index, failure))
            });

            if let Some((index, failure)) = origin {
                return Err(Self::fail_fast(&mut entries, index, failure));
            }

            if all_exited {
                break;
            }

            tokio::time::sleep(config.poll_interval).await;
        }

        for entry in entries.iter_mut() {
            entry.worker.join(config.join_timeout).await?;
        }

        let results = Self::drain(&mut entries)?;
        info!("All {} workers completed", results.len());
        Ok(results)
    }

    fn check_ids(entries: &[Entry]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for entry in entries {
            if !seen.insert(entry.worker.id()) {
                return Err(SupervisorError::Orchestration(format!(
                    "duplicate worker id {}",
                    entry.worker.id()
                )));
            }
        }
        Ok(())
    }

    /// Start every worker in order, stopping at the first bootstrap failure.
    fn start_all(entries: &mut [Entry]) -> Result<()> {
        for index in 0..entries.len() {
            if let Err(e) = entries[index].worker.start() {
                error!(worker = %entries[index].worker.id(), error = %e, "Worker failed to start");
                for started in entries[..index].iter_mut() {
                    started.worker.cancel();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Cancel every sibling of the failed worker and build the run's error.
    fn fail_fast(entries: &mut [Entry], origin: usize, failure: FailureRecord) -> SupervisorError {
        let worker = entries[origin].worker.id().clone();
        warn!(worker = %worker, error = %failure.message, "Worker failed, cancelling siblings");

        let mut cancelled = Vec::new();
        for (index, entry) in entries.iter_mut().enumerate() {
            if index == origin {
                continue;
            }
            entry.worker.cancel();
            if entry.worker.poll_outcome().is_none() {
                cancelled.push(entry.worker.id().clone());
            }
        }

        debug!(cancelled = ?cancelled, "Siblings with unknown outcome");

        SupervisorError::WorkerFailure {
            worker,
            failure,
            cancelled,
        }
    }

    /// Take each worker's result exactly once.
    fn drain(entries: &mut [Entry]) -> Result<RunResults> {
        let mut results = RunResults::new();

        for entry in entries.iter_mut() {
            let id = entry.worker.id().clone();
            match entry.worker.poll_outcome().cloned() {
                Some(ExitReport::Success) => {
                    let Some(payload) = entry.results.try_take() else {
                        return Err(SupervisorError::Orchestration(format!(
                            "worker {} reported success but delivered no result",
                            id
                        )));
                    };
                    results.insert(id, payload);
                }
                Some(ExitReport::Failure(failure)) => {
                    return Err(SupervisorError::WorkerFailure {
                        worker: id,
                        failure,
                        cancelled: Vec::new(),
                    });
                }
                None => {
                    return Err(SupervisorError::Orchestration(format!(
                        "worker {} exited without an exit report",
                        id
                    )));
                }
            }
        }

        Ok(results)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("workers", &self.entries.iter().map(|e| e.worker.id()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use failfast_core::Task;
    use failfast_worker::TaskIsolation;
    use serde_json::json;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Task for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, params: &Payload) -> std::result::Result<Payload, anyhow::Error> {
            Ok(params.clone())
        }
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig::new().with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_empty_run_returns_empty_map() {
        let results = Coordinator::new(config()).run().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_fails_run_before_start() {
        let mut coordinator = Coordinator::new(config());
        let item = WorkItem::new(Arc::new(Echo), json!(1));
        coordinator.add_work("w", item.clone(), Arc::new(TaskIsolation));
        coordinator.add_work("w", item, Arc::new(TaskIsolation));
        assert_eq!(coordinator.len(), 2);

        let err = coordinator.run().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Orchestration(ref m) if m.contains("duplicate worker id w")));
    }

    #[tokio::test]
    async fn test_results_keyed_by_id() {
        let mut coordinator = Coordinator::new(config());
        for (id, n) in [("b", 2), ("a", 1)] {
            coordinator.add_work(id, WorkItem::new(Arc::new(Echo), json!(n)), Arc::new(TaskIsolation));
        }
        assert!(!coordinator.is_empty());

        let results = coordinator.run().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&WorkerId::from("a")], json!(1));
        assert_eq!(results[&WorkerId::from("b")], json!(2));
    }

    #[tokio::test]
    async fn test_debug_lists_workers() {
        let mut coordinator = Coordinator::new(config());
        coordinator.add_work("worker1", WorkItem::new(Arc::new(Echo), json!(1)), Arc::new(TaskIsolation));
        assert!(format!("{:?}", coordinator).contains("worker1"));
    }
}
