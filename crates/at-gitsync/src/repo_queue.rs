//! Per-repository queue state: a priority queue of `queued` ops and a
//! bounded `running` set (SPEC_FULL.md §4.E). Not thread-safe on its
//! own — callers hold it behind a `tokio::sync::Mutex` per repository.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;

use crate::types::{HistoryFilter, Operation, OperationError, OperationStatus, QueueStats};

const HISTORY_RING_CAPACITY: usize = 500;

pub struct RepoQueue {
    pub max_concurrent: usize,
    queued: Vec<Operation>,
    running: HashMap<String, Operation>,
    history: VecDeque<Operation>,
}

impl RepoQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            queued: Vec::new(),
            running: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    /// Enqueue `op`, then attempt to auto-start it (and anything else
    /// eligible) immediately.
    pub fn enqueue(&mut self, op: Operation) -> Operation {
        self.queued.push(op.clone());
        self.drain();
        self.running
            .get(&op.id)
            .cloned()
            .unwrap_or_else(|| self.find_queued(&op.id).expect("just enqueued"))
    }

    fn find_queued(&self, id: &str) -> Option<Operation> {
        self.queued.iter().find(|o| o.id == id).cloned()
    }

    /// Pop queued ops (highest priority first, ties by earliest
    /// `queued_at`) into the running set until the cap is reached,
    /// skipping any whose branch already has a running operation.
    pub fn drain(&mut self) {
        loop {
            if self.running.len() >= self.max_concurrent {
                return;
            }
            let running_branches: std::collections::HashSet<&str> =
                self.running.values().map(|o| o.branch.as_str()).collect();

            let next_idx = self
                .queued
                .iter()
                .enumerate()
                .filter(|(_, o)| !running_branches.contains(o.branch.as_str()))
                .min_by(|(_, a), (_, b)| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| a.queued_at.cmp(&b.queued_at))
                })
                .map(|(idx, _)| idx);

            let Some(idx) = next_idx else {
                return;
            };

            let mut op = self.queued.remove(idx);
            op.status = OperationStatus::Running;
            op.started_at = Some(Utc::now());
            self.running.insert(op.id.clone(), op);
        }
    }

    pub fn get(&self, id: &str) -> Option<Operation> {
        self.running
            .get(id)
            .cloned()
            .or_else(|| self.find_queued(id))
            .or_else(|| self.history.iter().find(|o| o.id == id).cloned())
    }

    /// Move a running operation to a terminal state, append it to
    /// history, and drain the queue for this repository.
    pub fn terminate(&mut self, id: &str, status: OperationStatus, error: Option<OperationError>) -> Option<Operation> {
        let mut op = self.running.remove(id)?;
        op.status = status;
        op.completed_at = Some(Utc::now());
        op.error = error;
        self.push_history(op.clone());
        self.drain();
        Some(op)
    }

    /// Re-enqueue a failed operation for retry.
    pub fn requeue(&mut self, id: &str, next_attempt_at: chrono::DateTime<Utc>, error: OperationError) -> Option<Operation> {
        let mut op = self.running.remove(id)?;
        op.attempt += 1;
        op.status = OperationStatus::Queued;
        op.started_at = None;
        op.next_attempt_at = Some(next_attempt_at);
        op.error = Some(error);
        self.queued.push(op.clone());
        self.drain();
        Some(op)
    }

    fn push_history(&mut self, op: Operation) {
        self.history.push_back(op);
        while self.history.len() > HISTORY_RING_CAPACITY {
            self.history.pop_front();
        }
    }

    pub fn queued(&self) -> Vec<Operation> {
        self.queued.clone()
    }

    pub fn running(&self) -> Vec<Operation> {
        self.running.values().cloned().collect()
    }

    pub fn history(&self, filter: &HistoryFilter) -> Vec<Operation> {
        let mut items: Vec<Operation> = self
            .history
            .iter()
            .filter(|o| filter.status.map(|s| s == o.status).unwrap_or(true))
            .cloned()
            .collect();
        items.reverse();
        if let Some(limit) = filter.limit {
            items.truncate(limit);
        }
        items
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.len(),
            running: self.running.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryCode;
    use crate::types::OperationKind;
    use chrono::Duration;

    fn op(id: &str, branch: &str, priority: i32, queued_at: chrono::DateTime<Utc>) -> Operation {
        Operation {
            id: id.to_string(),
            repository_id: "repo1".into(),
            branch: branch.to_string(),
            priority,
            agent_id: "agent1".into(),
            operation: OperationKind::Push,
            command: "push".into(),
            args: vec![],
            status: OperationStatus::Queued,
            attempt: 0,
            max_attempts: 3,
            queued_at,
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
            error: None,
        }
    }

    #[test]
    fn enqueue_auto_starts_when_under_cap() {
        let mut q = RepoQueue::new(3);
        let result = q.enqueue(op("a", "main", 0, Utc::now()));
        assert_eq!(result.status, OperationStatus::Running);
    }

    #[test]
    fn enqueue_beyond_cap_stays_queued() {
        let mut q = RepoQueue::new(1);
        q.enqueue(op("a", "main", 0, Utc::now()));
        let second = q.enqueue(op("b", "feature", 0, Utc::now()));
        assert_eq!(second.status, OperationStatus::Queued);
    }

    #[test]
    fn higher_priority_starts_before_lower() {
        let mut q = RepoQueue::new(1);
        q.enqueue(op("a", "main", 0, Utc::now()));
        q.enqueue(op("b", "feature", 10, Utc::now()));
        let stats = q.stats();
        assert_eq!(stats.running, 1);
        assert!(q.get("b").unwrap().status == OperationStatus::Running);
    }

    #[test]
    fn same_branch_does_not_run_two_at_once() {
        let mut q = RepoQueue::new(5);
        q.enqueue(op("a", "main", 0, Utc::now()));
        let second = q.enqueue(op("b", "main", 0, Utc::now() + Duration::seconds(1)));
        assert_eq!(second.status, OperationStatus::Queued);
    }

    #[test]
    fn terminate_drains_the_next_queued_op() {
        let mut q = RepoQueue::new(1);
        q.enqueue(op("a", "main", 0, Utc::now()));
        q.enqueue(op("b", "feature", 0, Utc::now()));
        q.terminate("a", OperationStatus::Completed, None);
        assert_eq!(q.get("b").unwrap().status, OperationStatus::Running);
    }

    #[test]
    fn requeue_increments_attempt_and_goes_back_to_queued() {
        let mut q = RepoQueue::new(1);
        q.enqueue(op("a", "main", 0, Utc::now()));
        let requeued = q
            .requeue(
                "a",
                Utc::now(),
                OperationError {
                    code: RetryCode::Network,
                    message: "network error".into(),
                },
            )
            .unwrap();
        assert_eq!(requeued.attempt, 1);
        assert_eq!(requeued.status, OperationStatus::Queued);
        assert_eq!(requeued.error.unwrap().code, RetryCode::Network);
    }

    #[test]
    fn history_filter_by_status() {
        let mut q = RepoQueue::new(1);
        q.enqueue(op("a", "main", 0, Utc::now()));
        q.terminate(
            "a",
            OperationStatus::Failed,
            Some(OperationError {
                code: RetryCode::Unknown,
                message: "boom".into(),
            }),
        );
        let filter = HistoryFilter {
            status: Some(OperationStatus::Failed),
            limit: None,
        };
        assert_eq!(q.history(&filter).len(), 1);
    }
}
