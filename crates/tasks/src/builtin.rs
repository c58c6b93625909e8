//! Built-in tasks (static payloads, delays, failures, child processes).

use async_trait::async_trait;
use failfast_core::{Payload, Task};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Environment variable a [`CommandTask`] child receives its parameters in.
pub const PARAMS_ENV: &str = "FAILFAST_PARAMS";

/// Returns a fixed payload.
#[derive(Debug, Clone)]
pub struct StaticTask {
    payload: Payload,
}

impl StaticTask {
    /// Create a task returning `payload`.
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl Task for StaticTask {
    fn name(&self) -> &str {
        "static"
    }

    async fn execute(&self, _params: &Payload) -> Result<Payload, anyhow::Error> {
        Ok(self.payload.clone())
    }
}

/// Sleeps, then returns a fixed payload.
#[derive(Debug, Clone)]
pub struct DelayedTask {
    payload: Payload,
    delay: Duration,
}

impl DelayedTask {
    /// Create a task returning `payload` after `delay`.
    pub fn new(payload: Payload, delay: Duration) -> Self {
        Self { payload, delay }
    }
}

#[async_trait]
impl Task for DelayedTask {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn execute(&self, _params: &Payload) -> Result<Payload, anyhow::Error> {
        tokio::time::sleep(self.delay).await;
        Ok(self.payload.clone())
    }
}

/// Sleeps, then fails with a fixed message.
#[derive(Debug, Clone)]
pub struct FailTask {
    message: String,
    delay: Duration,
}

impl FailTask {
    /// Create a task failing immediately with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            delay: Duration::ZERO,
        }
    }

    /// Fail only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Task for FailTask {
    fn name(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _params: &Payload) -> Result<Payload, anyhow::Error> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Panics with a fixed message.
#[derive(Debug, Clone)]
pub struct PanicTask {
    message: String,
}

impl PanicTask {
    /// Create a task panicking with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Task for PanicTask {
    fn name(&self) -> &str {
        "panic"
    }

    async fn execute(&self, _params: &Payload) -> Result<Payload, anyhow::Error> {
        panic!("{}", self.message)
    }
}

/// Runs a child process.
///
/// The work item's parameters are passed to the child as JSON in
/// [`PARAMS_ENV`]. Stdout is parsed as JSON, falling back to a string. A
/// non-zero exit fails with the child's stderr. The child is killed if the
/// task is dropped before it exits.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandTask {
    /// Create a task running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Add environment variables for the child.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    fn parse_stdout(stdout: &[u8]) -> Payload {
        let text = String::from_utf8_lossy(stdout);
        let trimmed = text.trim();
        serde_json::from_str(trimmed).unwrap_or_else(|_| Payload::String(trimmed.to_string()))
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(&self, params: &Payload) -> Result<Payload, anyhow::Error> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(PARAMS_ENV, params.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let output = cmd.output().await.map_err(|e| {
            anyhow::Error::new(e).context(format!("failed to run {}", self.program))
        })?;

        debug!(
            program = %self.program,
            exit_code = ?output.status.code(),
            duration = ?start.elapsed(),
            "Command finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr
            );
        }

        Ok(Self::parse_stdout(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_task() {
        let task = StaticTask::new(json!({ "users": 2 }));
        assert_eq!(task.execute(&Payload::Null).await.unwrap(), json!({ "users": 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task() {
        let task = DelayedTask::new(json!({ "users": 5 }), Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        assert_eq!(task.execute(&Payload::Null).await.unwrap(), json!({ "users": 5 }));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_fail_task() {
        let err = FailTask::new("bad input").execute(&Payload::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "bad input");
    }

    #[tokio::test]
    async fn test_panic_task_panics() {
        let handle = tokio::spawn(async {
            let task = PanicTask::new("boom");
            task.execute(&Payload::Null).await
        });
        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
    }

    #[test]
    fn test_parse_stdout() {
        assert_eq!(CommandTask::parse_stdout(b"{\"users\": 2}\n"), json!({ "users": 2 }));
        assert_eq!(CommandTask::parse_stdout(b"hello\n"), json!("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_task_passes_params() {
        let task = CommandTask::new("sh", vec!["-c".to_string(), "echo \"$FAILFAST_PARAMS\"".to_string()]);
        let out = task.execute(&json!({ "users": 7 })).await.unwrap();
        assert_eq!(out, json!({ "users": 7 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_task_failure_carries_stderr() {
        let task = CommandTask::new(
            "sh",
            vec!["-c".to_string(), "echo 'bad input' >&2; exit 3".to_string()],
        );
        let err = task.execute(&Payload::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "sh exited with 3: bad input");
    }

    #[tokio::test]
    async fn test_command_task_missing_program() {
        let task = CommandTask::new("failfast-definitely-not-a-program", vec![]);
        let err = task.execute(&Payload::Null).await.unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_task_env() {
        let env = HashMap::from([("GREETING".to_string(), "hi".to_string())]);
        let task = CommandTask::new("sh", vec!["-c".to_string(), "echo $GREETING".to_string()])
            .with_env(env);
        assert_eq!(task.execute(&Payload::Null).await.unwrap(), json!("hi"));
    }
}
