//! failfast CLI - run workers concurrently, stop at the first failure.

mod plan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use failfast_coordinator::{Coordinator, CoordinatorConfig, RunResults};
use failfast_core::WorkItem;
use failfast_tasks::{DelayedTask, FailTask, StaticTask};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plan::{IsolationKind, RunPlan};

#[derive(Parser)]
#[command(name = "failfast")]
#[command(about = "Run workers concurrently and fail fast on the first error", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workers described in a JSON plan
    Run {
        /// Plan file
        plan: PathBuf,
        /// Override the plan's isolation backend
        #[arg(long, value_enum)]
        isolation: Option<IsolationKind>,
        /// Override the plan's poll interval
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Run two built-in workers
    Demo {
        /// Make the first worker fail while the second runs for a minute
        #[arg(long)]
        fail: bool,
        /// Isolation backend
        #[arg(long, value_enum, default_value = "thread")]
        isolation: IsolationKind,
    },
}

fn init_logging() {
    // Logs go to stderr so stdout only carries the results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let coordinator = match cli.command {
        Commands::Run {
            plan,
            isolation,
            poll_interval_ms,
        } => {
            let mut plan = RunPlan::load(&plan)?;
            if let Some(isolation) = isolation {
                plan.isolation = isolation;
            }
            if let Some(ms) = poll_interval_ms {
                plan.config = plan.config.with_poll_interval(Duration::from_millis(ms));
            }
            info!(workers = plan.workers.len(), isolation = ?plan.isolation, "Loaded plan");
            plan.coordinator()
        }
        Commands::Demo { fail, isolation } => demo(fail, isolation),
    };

    let results = coordinator.run().await?;
    print_results(&results)?;

    Ok(())
}

fn demo(fail: bool, isolation: IsolationKind) -> Coordinator {
    let mut coordinator = Coordinator::new(CoordinatorConfig::default());
    let backend = isolation.backend();

    let (first, second): (WorkItem, WorkItem) = if fail {
        (
            WorkItem::without_params(Arc::new(FailTask::new("bad input"))),
            WorkItem::without_params(Arc::new(DelayedTask::new(
                json!({ "users": 5 }),
                Duration::from_secs(60),
            ))),
        )
    } else {
        (
            WorkItem::without_params(Arc::new(StaticTask::new(json!({ "users": 2 })))),
            WorkItem::without_params(Arc::new(StaticTask::new(json!({ "users": 5 })))),
        )
    };

    coordinator.add_work("worker1", first, backend.clone());
    coordinator.add_work("worker2", second, backend);
    coordinator
}

fn print_results(results: &RunResults) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
