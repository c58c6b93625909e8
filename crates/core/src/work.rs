//! Work item abstraction.

use async_trait::async_trait;
use std::sync::Arc;

use crate::Payload;

/// A unit of work that can be run inside an isolated context.
///
/// Implementations either produce a result payload for the given parameters
/// or fail with an error. They never talk to the supervisor directly: the
/// worker running them turns the outcome into an exit report.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Get task name.
    fn name(&self) -> &str;

    /// Execute the task.
    async fn execute(&self, params: &Payload) -> Result<Payload, anyhow::Error>;
}

/// A task bound to its input parameters.
///
/// Immutable once constructed. Cloning shares the task.
#[derive(Clone)]
pub struct WorkItem {
    task: Arc<dyn Task>,
    params: Payload,
}

impl WorkItem {
    /// Bind a task to its parameters.
    pub fn new(task: Arc<dyn Task>, params: Payload) -> Self {
        Self { task, params }
    }

    /// Bind a task with no parameters.
    pub fn without_params(task: Arc<dyn Task>) -> Self {
        Self::new(task, Payload::Null)
    }

    /// Name of the underlying task.
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Input parameters.
    pub fn params(&self) -> &Payload {
        &self.params
    }

    /// Run the task against its parameters.
    pub async fn run(&self) -> Result<Payload, anyhow::Error> {
        self.task.execute(&self.params).await
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("task", &self.task.name())
            .field("params", &self.params)
            .finish()
    }
}
