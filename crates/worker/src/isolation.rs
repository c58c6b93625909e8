//! Isolation primitives.
//!
//! An isolation backend creates an independent execution context for a job,
//! and hands back a handle that can check liveness, request termination and
//! wait for exit. Everything that crosses the boundary goes through channels
//! the job owns; the handle carries no data.

use async_trait::async_trait;
use failfast_core::{Result, SupervisorError, WorkerId};
use futures::future::BoxFuture;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// A job to run inside an isolated context.
pub type Job = BoxFuture<'static, ()>;

/// Creates isolated execution contexts.
pub trait Isolation: Send + Sync {
    /// Launch a context running `job`.
    ///
    /// Fails with [`SupervisorError::Bootstrap`] if the context cannot be
    /// created.
    fn launch(&self, worker: &WorkerId, job: Job) -> Result<Box<dyn IsolationHandle>>;
}

/// Control handle for one launched context.
#[async_trait]
pub trait IsolationHandle: Send + Sync {
    /// True while the context has not exited.
    fn is_alive(&self) -> bool;

    /// Request forcible termination. Best-effort and not awaited.
    fn cancel(&self);

    /// Wait up to `timeout` for the context to exit. Returns whether it did.
    async fn wait(&mut self, timeout: Duration) -> bool;
}

/// Runs each worker as a Tokio task on the ambient runtime.
///
/// Only for work items that yield cooperatively. Workers share the
/// supervisor's scheduler, so one that blocks its thread (sleeps, spins on
/// CPU, does synchronous I/O) can hold up polling and delay failure detection
/// well past the poll interval. Use [`ThreadIsolation`] for anything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskIsolation;

impl TaskIsolation {
    /// Create a task isolation backend.
    pub fn new() -> Self {
        Self
    }
}

impl Isolation for TaskIsolation {
    fn launch(&self, worker: &WorkerId, job: Job) -> Result<Box<dyn IsolationHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SupervisorError::Bootstrap {
                worker: worker.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(worker = %worker, "Spawning worker task");
        let handle = runtime.spawn(job);

        Ok(Box::new(TaskHandle {
            handle: Some(handle),
        }))
    }
}

struct TaskHandle {
    handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl IsolationHandle for TaskHandle {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return true;
        };

        // Aborted and panicked tasks both count as exited.
        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => {
                self.handle = None;
                true
            }
            Err(_) => false,
        }
    }
}

/// Runs each worker on a dedicated OS thread with its own single-threaded
/// Tokio runtime. The default backend.
///
/// Cancellation drops the job at its next suspension point. A job stuck in
/// blocking code keeps its thread until it yields.
#[derive(Debug, Clone, Default)]
pub struct ThreadIsolation {
    stack_size: Option<usize>,
}

impl ThreadIsolation {
    /// Create a thread isolation backend with the platform default stack size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stack size of worker threads, in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Isolation for ThreadIsolation {
    fn launch(&self, worker: &WorkerId, job: Job) -> Result<Box<dyn IsolationHandle>> {
        let bootstrap = |reason: String| SupervisorError::Bootstrap {
            worker: worker.clone(),
            reason,
        };

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<std::result::Result<(), String>>(1);

        let mut builder = std::thread::Builder::new().name(format!("failfast-{}", worker));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        // The runtime is built on the worker thread so it is also dropped there.
        let thread = builder
            .spawn(move || {
                let _exited = exit_tx;
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                runtime.block_on(async move {
                    tokio::select! {
                        _ = job => {}
                        Ok(()) = kill_rx => {}
                    }
                });
            })
            .map_err(|e| bootstrap(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(bootstrap(reason)),
            Err(_) => return Err(bootstrap("worker thread exited during startup".to_string())),
        }

        debug!(worker = %worker, "Spawned worker thread");

        Ok(Box::new(ThreadHandle {
            thread,
            kill: Mutex::new(Some(kill_tx)),
            exited: Some(exit_rx),
        }))
    }
}

struct ThreadHandle {
    thread: std::thread::JoinHandle<()>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    exited: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl IsolationHandle for ThreadHandle {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    fn cancel(&self) {
        let kill = match self.kill.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        if let Some(exited) = self.exited.as_mut() {
            // Resolves with an error once the thread drops the sender on exit.
            if tokio::time::timeout(timeout, exited).await.is_err() {
                return false;
            }
            self.exited = None;
        }

        // The sender is dropped just before the thread returns.
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.thread.is_finished() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn id() -> WorkerId {
        WorkerId::from("worker1")
    }

    #[tokio::test]
    async fn test_task_isolation_runs_job() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut handle = TaskIsolation::new()
            .launch(&id(), async move { flag.store(true, Ordering::SeqCst) }.boxed())
            .unwrap();

        assert!(handle.wait(Duration::from_secs(5)).await);
        assert!(!handle.is_alive());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_task_isolation_cancel() {
        let mut handle = TaskIsolation::new()
            .launch(&id(), async { tokio::time::sleep(Duration::from_secs(60)).await }.boxed())
            .unwrap();

        assert!(handle.is_alive());
        handle.cancel();
        assert!(handle.wait(Duration::from_secs(5)).await);
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_task_isolation_without_runtime_is_bootstrap_error() {
        let err = TaskIsolation::new()
            .launch(&id(), async {}.boxed())
            .err()
            .unwrap();
        assert!(err.is_bootstrap());
    }

    #[tokio::test]
    async fn test_thread_isolation_runs_job() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut handle = ThreadIsolation::new()
            .launch(&id(), async move { flag.store(true, Ordering::SeqCst) }.boxed())
            .unwrap();

        assert!(handle.wait(Duration::from_secs(5)).await);
        assert!(!handle.is_alive());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_thread_isolation_cancel() {
        let mut handle = ThreadIsolation::new()
            .with_stack_size(256 * 1024)
            .launch(&id(), async { tokio::time::sleep(Duration::from_secs(60)).await }.boxed())
            .unwrap();

        assert!(handle.is_alive());
        handle.cancel();
        handle.cancel();
        assert!(handle.wait(Duration::from_secs(5)).await);
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_thread_isolation_wait_times_out() {
        let mut handle = ThreadIsolation::new()
            .launch(&id(), async { tokio::time::sleep(Duration::from_secs(60)).await }.boxed())
            .unwrap();

        assert!(!handle.wait(Duration::from_millis(20)).await);
        handle.cancel();
        assert!(handle.wait(Duration::from_secs(5)).await);
    }
}
