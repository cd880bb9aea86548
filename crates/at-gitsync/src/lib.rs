//! Per-repository git operation scheduler: bounded concurrency, retry
//! classification with exponential backoff, and cancellation
//! (SPEC_FULL.md §4.E).

mod error;
mod repo_queue;
mod retry;
mod types;

pub use error::GitSyncError;
pub use retry::{classify, RetryCode};
pub use types::{
    FailOutcome, GlobalStats, HistoryFilter, Operation, OperationError, OperationKind,
    OperationStatus, QueueStats, SyncRequest,
};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use at_cliwrap::{CommandExecutor, RunOptions};
use at_core::config::GitSyncConfig;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::instrument;

use repo_queue::RepoQueue;

pub struct GitSync {
    config: GitSyncConfig,
    executor: Arc<dyn CommandExecutor>,
    repos: DashMap<String, Mutex<RepoQueue>>,
    op_index: DashMap<String, String>,
}

impl GitSync {
    pub fn new(config: GitSyncConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            executor,
            repos: DashMap::new(),
            op_index: DashMap::new(),
        }
    }

    async fn with_repo<F, T>(&self, repository_id: &str, f: F) -> T
    where
        F: FnOnce(&mut RepoQueue) -> T,
    {
        self.repos
            .entry(repository_id.to_string())
            .or_insert_with(|| Mutex::new(RepoQueue::new(self.config.max_concurrent_ops)));
        let entry = self.repos.get(repository_id).expect("just inserted");
        let mut guard = entry.lock().await;
        f(&mut guard)
    }

    #[instrument(skip(self, req), fields(repository_id = %req.repository_id, branch = %req.branch))]
    pub async fn queue(&self, req: SyncRequest) -> Operation {
        let id = at_core::ids::new_id("gso");
        self.op_index.insert(id.clone(), req.repository_id.clone());
        let op = Operation {
            id,
            repository_id: req.repository_id.clone(),
            branch: req.branch,
            priority: req.priority,
            agent_id: req.agent_id,
            operation: req.operation,
            command: req.command,
            args: req.args,
            status: OperationStatus::Queued,
            attempt: 0,
            max_attempts: self.config.max_retries,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
            error: None,
        };
        let repository_id = req.repository_id;
        self.with_repo(&repository_id, move |q| q.enqueue(op)).await
    }

    fn repository_of(&self, id: &str) -> Option<String> {
        self.op_index.get(id).map(|r| r.to_string())
    }

    pub async fn get_operation(&self, id: &str) -> Option<Operation> {
        let repository_id = self.repository_of(id)?;
        self.with_repo(&repository_id, |q| q.get(id)).await
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, id: &str) -> Result<Operation, GitSyncError> {
        let repository_id = self.repository_of(id).ok_or_else(|| GitSyncError::NotFound(id.to_string()))?;
        self.with_repo(&repository_id, |q| q.terminate(id, OperationStatus::Completed, None))
            .await
            .ok_or_else(|| GitSyncError::NotFound(id.to_string()))
    }

    /// Classify `error_text` and either re-enqueue for retry or mark the
    /// operation terminally failed.
    #[instrument(skip(self, error_text))]
    pub async fn fail(&self, id: &str, error_text: &str) -> Result<FailOutcome, GitSyncError> {
        let repository_id = self.repository_of(id).ok_or_else(|| GitSyncError::NotFound(id.to_string()))?;
        let code = retry::classify(error_text);

        let current_attempt = self
            .with_repo(&repository_id, |q| q.get(id))
            .await
            .ok_or_else(|| GitSyncError::NotFound(id.to_string()))?
            .attempt;

        let next_attempt = current_attempt + 1;
        let will_retry = code.retryable() && next_attempt < self.config.max_retries;

        let error = types::OperationError {
            code,
            message: error_text.to_string(),
        };

        if will_retry {
            let delay = retry::backoff(self.config.base_delay_ms, next_attempt, code);
            let next_attempt_at = Utc::now()
                + chrono::Duration::milliseconds(delay.as_millis() as i64);
            self.with_repo(&repository_id, |q| q.requeue(id, next_attempt_at, error))
                .await;
            Ok(FailOutcome {
                will_retry: true,
                next_attempt_at: Some(next_attempt_at),
            })
        } else {
            self.with_repo(&repository_id, |q| {
                q.terminate(id, OperationStatus::Failed, Some(error))
            })
            .await;
            Ok(FailOutcome {
                will_retry: false,
                next_attempt_at: None,
            })
        }
    }

    /// Cancel a queued or running operation. Only the owning agent (or an
    /// admin) may cancel; refused once the operation is terminal.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str, agent_id: &str, is_admin: bool) -> Result<bool, GitSyncError> {
        let repository_id = self.repository_of(id).ok_or_else(|| GitSyncError::NotFound(id.to_string()))?;
        let op = self
            .with_repo(&repository_id, |q| q.get(id))
            .await
            .ok_or_else(|| GitSyncError::NotFound(id.to_string()))?;

        if op.status.is_terminal() {
            return Err(GitSyncError::AlreadyTerminal(id.to_string()));
        }
        if !is_admin && op.agent_id != agent_id {
            return Err(GitSyncError::NotOwner);
        }

        let terminated = self
            .with_repo(&repository_id, |q| q.terminate(id, OperationStatus::Cancelled, None))
            .await;
        Ok(terminated.is_some())
    }

    pub async fn get_queued(&self, repository_id: &str) -> Vec<Operation> {
        self.with_repo(repository_id, |q| q.queued()).await
    }

    pub async fn get_running(&self, repository_id: &str) -> Vec<Operation> {
        self.with_repo(repository_id, |q| q.running()).await
    }

    pub async fn get_history(&self, repository_id: &str, filter: HistoryFilter) -> Vec<Operation> {
        self.with_repo(repository_id, |q| q.history(&filter)).await
    }

    pub async fn get_queue_stats(&self, repository_id: &str) -> QueueStats {
        self.with_repo(repository_id, |q| q.stats()).await
    }

    pub async fn get_global_stats(&self) -> GlobalStats {
        let mut per_repository = std::collections::HashMap::new();
        for entry in self.repos.iter() {
            let guard = entry.value().lock().await;
            per_repository.insert(entry.key().clone(), guard.stats());
        }
        GlobalStats { per_repository }
    }

    /// Execute a running operation's git work through the CLI wrapper
    /// façade, then drive the resulting `complete`/`fail` transition.
    #[instrument(skip(self))]
    pub async fn execute(&self, id: &str, deadline: StdDuration) -> Result<(), GitSyncError> {
        let op = self.get_operation(id).await.ok_or_else(|| GitSyncError::NotFound(id.to_string()))?;
        let opts = RunOptions {
            deadline,
            ..Default::default()
        };
        match self.executor.run(&op.command, &op.args, opts).await {
            Ok(_) => {
                self.complete(id).await?;
            }
            Err(e) => {
                self.fail(id, &e.to_string()).await?;
            }
        }
        Ok(())
    }
}
