//! Data description of built-in tasks, for run plans.

use failfast_core::{Payload, Task};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{CommandTask, DelayedTask, FailTask, PanicTask, StaticTask};

/// A built-in task, as written in a run plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    /// Return a payload
    Static {
        /// Payload to return
        payload: Payload,
    },
    /// Return a payload after a delay
    Delayed {
        /// Payload to return
        payload: Payload,
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// Fail with a message, optionally after a delay
    Fail {
        /// Error message
        message: String,
        /// Delay in milliseconds
        #[serde(default)]
        delay_ms: u64,
    },
    /// Panic with a message
    Panic {
        /// Panic message
        message: String,
    },
    /// Run a child process
    Command {
        /// Program to run
        program: String,
        /// Arguments
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl TaskSpec {
    /// Build the task this spec describes.
    pub fn build(&self) -> Arc<dyn Task> {
        match self {
            TaskSpec::Static { payload } => Arc::new(StaticTask::new(payload.clone())),
            TaskSpec::Delayed { payload, delay_ms } => Arc::new(DelayedTask::new(
                payload.clone(),
                Duration::from_millis(*delay_ms),
            )),
            TaskSpec::Fail { message, delay_ms } => Arc::new(
                FailTask::new(message.clone()).with_delay(Duration::from_millis(*delay_ms)),
            ),
            TaskSpec::Panic { message } => Arc::new(PanicTask::new(message.clone())),
            TaskSpec::Command { program, args, env } => {
                Arc::new(CommandTask::new(program.clone(), args.clone()).with_env(env.clone()))
            }
        }
    }
}
