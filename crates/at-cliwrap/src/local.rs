use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::executor::{truncate_stderr, CommandExecutor, CommandOutput, ExecutorError, RunOptions};

/// Spawns the real sub-binary via `tokio::process::Command`, enforcing
/// `opts.deadline` with `tokio::time::timeout` and killing the child on
/// expiry rather than leaving it to run unattended.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProcessExecutor;

#[async_trait]
impl CommandExecutor for LocalProcessExecutor {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        opts: RunOptions,
    ) -> Result<CommandOutput, ExecutorError> {
        let argv: Vec<String> = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect();

        let mut cmd = Command::new(command);
        cmd.args(args);
        if let Some(dir) = &opts.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &opts.env {
            cmd.env(k, v);
        }
        cmd.kill_on_drop(true);

        debug!(?argv, deadline_ms = opts.deadline.as_millis() as u64, "spawning command");

        let mut child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
            argv: argv.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(opts.deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ExecutorError::Spawn { argv, source }),
            Err(_) => {
                warn!(?argv, "command exceeded deadline, killing");
                return Err(ExecutorError::Timeout {
                    argv,
                    deadline_ms: opts.deadline.as_millis() as u64,
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code != 0 {
            return Err(ExecutorError::CommandFailed {
                exit_code,
                stderr: truncate_stderr(&stderr),
                argv,
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_real_command_and_captures_stdout() {
        let exec = LocalProcessExecutor;
        let out = exec
            .run("echo", &["hello".to_string()], RunOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert!(out.success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_command_failed_error() {
        let exec = LocalProcessExecutor;
        let err = exec
            .run("false", &[], RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let exec = LocalProcessExecutor;
        let opts = RunOptions {
            deadline: std::time::Duration::from_millis(50),
            ..Default::default()
        };
        let err = exec.run("sleep", &["5".to_string()], opts).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
    }
}
