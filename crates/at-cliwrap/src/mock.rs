use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::executor::{CommandExecutor, CommandOutput, ExecutorError, RunOptions};

/// Test double: returns pre-scripted responses in FIFO order, recording
/// every invocation so tests can assert on argv without a real binary.
pub struct MockExecutor {
    responses: Mutex<VecDeque<Result<CommandOutput, ExecutorError>>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_success(&self, stdout: impl Into<String>) {
        self.push(Ok(CommandOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }));
    }

    pub fn push(&self, response: Result<CommandOutput, ExecutorError>) {
        self.responses
            .try_lock()
            .expect("mock executor is single-threaded in tests")
            .push_back(response);
    }

    pub async fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        _opts: RunOptions,
    ) -> Result<CommandOutput, ExecutorError> {
        self.calls
            .lock()
            .await
            .push((command.to_string(), args.to_vec()));
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            })
    }
}
