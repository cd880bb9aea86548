use std::time::Duration;

use async_trait::async_trait;
use at_core::error::ErrorKind;

/// Options governing a single invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub working_dir: Option<String>,
    pub env: Vec<(String, String)>,
    pub deadline: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: Vec::new(),
            deadline: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Failure modes specific to spawning and waiting on a sub-binary.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to spawn {argv:?}: {source}")]
    Spawn {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("command timed out after {deadline_ms}ms: {argv:?}")]
    Timeout { argv: Vec<String>, deadline_ms: u64 },
    #[error("command exited {exit_code}: {argv:?}: {stderr}")]
    CommandFailed {
        exit_code: i32,
        stderr: String,
        argv: Vec<String>,
    },
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Spawn { .. } => ErrorKind::SystemUnavailable,
            ExecutorError::Timeout { .. } => ErrorKind::Timeout,
            ExecutorError::CommandFailed { .. } => ErrorKind::CommandFailed,
        }
    }
}

const STDERR_TRUNCATE_LEN: usize = 4096;

pub(crate) fn truncate_stderr(stderr: &str) -> String {
    if stderr.len() <= STDERR_TRUNCATE_LEN {
        stderr.to_string()
    } else {
        format!("{}... [truncated]", &stderr[..STDERR_TRUNCATE_LEN])
    }
}

/// A single capability interface over running a named sub-binary with
/// arguments, returning either its output or a structured error. Two
/// implementations: [`crate::LocalProcessExecutor`] (real subprocess) and
/// [`crate::MockExecutor`] (scripted, used by git-sync and CAAM tests).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        opts: RunOptions,
    ) -> Result<CommandOutput, ExecutorError>;
}
