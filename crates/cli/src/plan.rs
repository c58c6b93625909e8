//! Run plans: a JSON description of the workers to run.

use anyhow::{Context, Result};
use clap::ValueEnum;
use failfast_coordinator::{Coordinator, CoordinatorConfig};
use failfast_core::{Payload, WorkItem, WorkerId};
use failfast_tasks::TaskSpec;
use failfast_worker::{Isolation, TaskIsolation, ThreadIsolation};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Which isolation backend runs the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    /// Tokio task per worker; only for work that yields cooperatively
    Task,
    /// OS thread per worker
    #[default]
    Thread,
}

impl IsolationKind {
    pub(crate) fn backend(self) -> Arc<dyn Isolation> {
        match self {
            IsolationKind::Task => Arc::new(TaskIsolation::new()),
            IsolationKind::Thread => Arc::new(ThreadIsolation::new()),
        }
    }
}

/// One worker in a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPlan {
    pub id: WorkerId,
    pub task: TaskSpec,
    #[serde(default)]
    pub params: Payload,
}

/// A full run plan.
#[derive(Debug, Clone, Deserialize)]
pub struct RunPlan {
    #[serde(default)]
    pub config: CoordinatorConfig,
    #[serde(default)]
    pub isolation: IsolationKind,
    pub workers: Vec<WorkerPlan>,
}

impl RunPlan {
    /// Load a plan from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid plan {}", path.display()))
    }

    /// Build a coordinator with every worker of the plan added.
    pub fn coordinator(&self) -> Coordinator {
        let isolation = self.isolation.backend();
        let mut coordinator = Coordinator::new(self.config);

        for worker in &self.workers {
            let item = WorkItem::new(worker.task.build(), worker.params.clone());
            coordinator.add_work(worker.id.clone(), item, isolation.clone());
        }

        coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;

    fn write_plan(value: serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_plan() {
        let file = write_plan(json!({
            "workers": [
                { "id": "worker1", "task": { "kind": "static", "payload": { "users": 2 } } }
            ]
        }));

        let plan = RunPlan::load(file.path()).unwrap();
        assert_eq!(plan.isolation, IsolationKind::Thread);
        assert_eq!(plan.config, CoordinatorConfig::default());
        assert_eq!(plan.workers.len(), 1);
        assert_eq!(plan.workers[0].id.as_str(), "worker1");
        assert_eq!(plan.workers[0].params, Payload::Null);
    }

    #[test]
    fn test_load_full_plan() {
        let file = write_plan(json!({
            "config": { "poll_interval_ms": 20, "join_timeout_ms": 1000 },
            "isolation": "thread",
            "workers": [
                { "id": "a", "task": { "kind": "fail", "message": "bad input" } },
                { "id": "b", "task": { "kind": "delayed", "payload": 1, "delay_ms": 10 }, "params": { "x": 1 } }
            ]
        }));

        let plan = RunPlan::load(file.path()).unwrap();
        assert_eq!(plan.isolation, IsolationKind::Thread);
        assert_eq!(plan.config.poll_interval, Duration::from_millis(20));
        assert_eq!(plan.workers[1].params, json!({ "x": 1 }));
    }

    #[test]
    fn test_load_invalid_plan() {
        let file = write_plan(json!({ "workers": [{ "id": "a" }] }));
        let err = RunPlan::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid plan"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunPlan::load(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read plan"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_fail_the_run() {
        let file = write_plan(json!({
            "workers": [
                { "id": "a", "task": { "kind": "static", "payload": 1 } },
                { "id": "a", "task": { "kind": "static", "payload": 2 } }
            ]
        }));
        let plan = RunPlan::load(file.path()).unwrap();
        let err = plan.coordinator().run().await.unwrap_err();
        assert!(err.to_string().contains("duplicate worker id a"));
    }

    #[tokio::test]
    async fn test_plan_runs() {
        let file = write_plan(json!({
            "config": { "poll_interval_ms": 5 },
            "workers": [
                { "id": "worker1", "task": { "kind": "static", "payload": { "users": 2 } } },
                { "id": "worker2", "task": { "kind": "static", "payload": { "users": 5 } } }
            ]
        }));

        let plan = RunPlan::load(file.path()).unwrap();
        let results = plan.coordinator().run().await.unwrap();
        assert_eq!(results[&WorkerId::from("worker2")], json!({ "users": 5 }));
    }
}
