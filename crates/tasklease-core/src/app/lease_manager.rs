//! LeaseManager - タスクの登録と lease の状態遷移
//!
//! すべての操作はストアへの条件付き更新 1 回で完結する。更新が適用されな
//! かった場合だけ、理由を報告するためにタスクを 1 回読み直す。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::LeaseConfig;
use crate::domain::{NewTask, Task, TaskFailure, Transition};
use crate::error::LeaseError;
use crate::ports::{Clock, TaskStore};

#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: LeaseConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Register a new ready task.
    pub async fn add(&self, new: NewTask) -> Result<Task, LeaseError> {
        require_non_empty("id", &new.id)?;
        require_non_empty("queue", &new.queue)?;

        let id = new.id.clone();
        let task = Task::from_new(new, self.clock.now());
        match self.store.insert_if_absent(task).await? {
            Some(task) => {
                debug!(task_id = %task.id, queue = %task.queue, priority = task.priority, "task added");
                Ok(task)
            }
            None => Err(LeaseError::DuplicateKey(id)),
        }
    }

    /// Lease one specific ready task to `worker`.
    pub async fn claim(
        &self,
        id: &str,
        worker: &str,
        timeout: Option<Duration>,
    ) -> Result<Task, LeaseError> {
        require_non_empty("worker", worker)?;
        let now = self.clock.now();
        let transition = Transition::Claim {
            worker: worker.to_string(),
            deadline: self.deadline(now, timeout)?,
        };
        let task = self.transition(id, transition, now).await?;
        debug!(task_id = %task.id, worker, "task claimed");
        Ok(task)
    }

    /// Lease up to `limit` ready tasks of `queue` to `worker`. Never waits for
    /// tasks to appear; returns fewer (or none) when fewer are eligible.
    pub async fn claim_batch(
        &self,
        queue: &str,
        limit: usize,
        worker: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Task>, LeaseError> {
        require_non_empty("queue", queue)?;
        require_non_empty("worker", worker)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let deadline = self.deadline(now, timeout)?;
        let tasks = self
            .store
            .claim_top_n(queue, limit, worker, deadline, now)
            .await?;
        debug!(queue, worker, requested = limit, claimed = tasks.len(), "batch claimed");
        Ok(tasks)
    }

    /// Extend the lease of a running task. Only its owner may do this.
    pub async fn heartbeat(
        &self,
        id: &str,
        worker: &str,
        progress: Option<f32>,
        timeout: Option<Duration>,
    ) -> Result<Task, LeaseError> {
        if let Some(progress) = progress
            && !(0.0..=1.0).contains(&progress)
        {
            return Err(LeaseError::validation(format!(
                "progress must be within [0, 1], got {progress}"
            )));
        }
        let now = self.clock.now();
        let transition = Transition::Heartbeat {
            worker: worker.to_string(),
            deadline: self.deadline(now, timeout)?,
            progress,
        };
        let task = self.transition(id, transition, now).await?;
        debug!(task_id = %task.id, worker, progress = task.progress, "heartbeat");
        Ok(task)
    }

    /// Ask to give the lease back. The task stays running until the next
    /// sweep turns it ready.
    pub async fn yield_task(&self, id: &str) -> Result<Task, LeaseError> {
        let task = self.transition(id, Transition::Yield, self.clock.now()).await?;
        debug!(task_id = %task.id, "yield requested");
        Ok(task)
    }

    pub async fn cancel(&self, id: &str) -> Result<Task, LeaseError> {
        let task = self.transition(id, Transition::Cancel, self.clock.now()).await?;
        debug!(task_id = %task.id, "task cancelled");
        Ok(task)
    }

    pub async fn complete(&self, id: &str) -> Result<Task, LeaseError> {
        let task = self.transition(id, Transition::Complete, self.clock.now()).await?;
        debug!(task_id = %task.id, "task completed");
        Ok(task)
    }

    /// Fail a running task permanently, recording `failure`.
    pub async fn abort(&self, id: &str, failure: TaskFailure) -> Result<Task, LeaseError> {
        if failure.args.is_null() {
            return Err(LeaseError::validation("abort requires error args"));
        }
        let code = failure.code.clone();
        let task = self
            .transition(id, Transition::Abort { failure }, self.clock.now())
            .await?;
        debug!(task_id = %task.id, code = %code, "task aborted");
        Ok(task)
    }

    async fn transition(
        &self,
        id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Task, LeaseError> {
        if let Some(task) = self.store.conditional_update(id, &transition, now).await? {
            return Ok(task);
        }
        // The row may have changed since; report what it looks like now.
        match self.store.get(id).await? {
            Some(task) => Err(transition.rejection(&task)),
            None => Err(LeaseError::NotFound(id.to_string())),
        }
    }

    fn deadline(
        &self,
        now: DateTime<Utc>,
        timeout: Option<Duration>,
    ) -> Result<DateTime<Utc>, LeaseError> {
        let timeout = timeout.unwrap_or(self.config.default_lease);
        if timeout.is_zero() {
            return Err(LeaseError::validation("lease timeout must be positive"));
        }
        chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .ok_or_else(|| LeaseError::validation("lease timeout is out of range"))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), LeaseError> {
    if value.is_empty() {
        return Err(LeaseError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoryKind, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn manager() -> (LeaseManager, FixedClock) {
        let clock = FixedClock::new(t0());
        let manager = LeaseManager::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(clock.clone()),
            LeaseConfig::default(),
        );
        (manager, clock)
    }

    async fn running(manager: &LeaseManager, id: &str, worker: &str) -> Task {
        manager.add(NewTask::new(id, "q", json!({}))).await.unwrap();
        manager.claim(id, worker, None).await.unwrap()
    }

    #[tokio::test]
    async fn add_rejects_duplicate_ids() {
        let (manager, _) = manager();
        manager.add(NewTask::new("t1", "q", json!({"a": 1}))).await.unwrap();

        let err = manager.add(NewTask::new("t1", "q2", json!({}))).await.unwrap_err();
        assert!(matches!(err, LeaseError::DuplicateKey(id) if id == "t1"));
    }

    #[rstest]
    #[case::empty_id(NewTask::new("", "q", json!({})))]
    #[case::empty_queue(NewTask::new("t1", "", json!({})))]
    #[tokio::test]
    async fn add_validates_identity(#[case] new: NewTask) {
        let (manager, _) = manager();
        assert!(matches!(manager.add(new).await, Err(LeaseError::Validation(_))));
    }

    #[tokio::test]
    async fn claim_uses_default_lease() {
        let (manager, _) = manager();
        let task = running(&manager, "t1", "w1").await;

        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.owner.as_deref(), Some("w1"));
        assert_eq!(task.deadline, Some(t0() + chrono::Duration::seconds(30)));
        assert_eq!(task.history.len(), 1);
        assert_eq!(task.history[0].kind, HistoryKind::Assignment);
    }

    #[tokio::test]
    async fn claim_of_running_task_is_invalid_state() {
        let (manager, _) = manager();
        running(&manager, "t1", "w1").await;

        let err = manager.claim("t1", "w2", None).await.unwrap_err();
        assert!(matches!(
            err,
            LeaseError::InvalidState { operation: "claim", status: TaskStatus::Running, .. }
        ));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (manager, _) = manager();
        assert!(matches!(manager.complete("nope").await, Err(LeaseError::NotFound(_))));
        assert!(matches!(manager.claim("nope", "w1", None).await, Err(LeaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let (manager, _) = manager();
        manager.add(NewTask::new("t1", "q", json!({}))).await.unwrap();
        let err = manager.claim("t1", "w1", Some(Duration::ZERO)).await.unwrap_err();
        assert!(matches!(err, LeaseError::Validation(_)));
    }

    #[tokio::test]
    async fn heartbeat_extends_from_now() {
        let (manager, clock) = manager();
        running(&manager, "t1", "w1").await;
        clock.advance(chrono::Duration::seconds(10));

        let task = manager
            .heartbeat("t1", "w1", Some(0.25), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(task.deadline, Some(t0() + chrono::Duration::seconds(70)));
        assert_eq!(task.progress, 0.25);
    }

    #[tokio::test]
    async fn heartbeat_by_non_owner_leaves_task_untouched() {
        let (manager, _) = manager();
        let before = running(&manager, "t1", "w1").await;

        let err = manager.heartbeat("t1", "w2", Some(0.9), None).await.unwrap_err();
        assert!(matches!(err, LeaseError::Validation(msg) if msg == "Only owner can extend the heartbeat."));

        let after = manager.store.get("t1").await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[rstest]
    #[case::negative(-0.1)]
    #[case::above_one(1.5)]
    #[tokio::test]
    async fn heartbeat_rejects_out_of_range_progress(#[case] progress: f32) {
        let (manager, _) = manager();
        running(&manager, "t1", "w1").await;
        let err = manager.heartbeat("t1", "w1", Some(progress), None).await.unwrap_err();
        assert!(matches!(err, LeaseError::Validation(_)));
    }

    #[tokio::test]
    async fn yield_records_intent_only() {
        let (manager, _) = manager();
        running(&manager, "t1", "w1").await;

        let task = manager.yield_task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.history.last().unwrap().kind, HistoryKind::Yield);
        assert_eq!(task.history.last().unwrap().worker, "w1");

        let again = manager.yield_task("t1").await.unwrap();
        assert_eq!(again.status, TaskStatus::Running);
        assert_eq!(again.history.len(), 3);
        assert_eq!(again.history[2].kind, HistoryKind::Yield);
    }

    #[tokio::test]
    async fn yield_requires_running() {
        let (manager, _) = manager();
        manager.add(NewTask::new("t1", "q", json!({}))).await.unwrap();
        assert!(matches!(
            manager.yield_task("t1").await,
            Err(LeaseError::InvalidState { operation: "yield", status: TaskStatus::Ready, .. })
        ));
    }

    #[tokio::test]
    async fn cancel_works_from_ready_and_running() {
        let (manager, _) = manager();
        manager.add(NewTask::new("ready", "q", json!({}))).await.unwrap();
        running(&manager, "busy", "w1").await;

        assert_eq!(manager.cancel("ready").await.unwrap().status, TaskStatus::Cancelled);
        let cancelled = manager.cancel("busy").await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(cancelled.owner.is_none() && cancelled.deadline.is_none());
    }

    #[tokio::test]
    async fn complete_requires_running() {
        let (manager, _) = manager();
        manager.add(NewTask::new("t1", "q", json!({}))).await.unwrap();
        assert!(matches!(
            manager.complete("t1").await,
            Err(LeaseError::InvalidState { status: TaskStatus::Ready, .. })
        ));
    }

    #[tokio::test]
    async fn abort_requires_args() {
        let (manager, _) = manager();
        running(&manager, "t1", "w1").await;

        let missing = TaskFailure::new("E", serde_json::Value::Null, "boom");
        assert!(matches!(manager.abort("t1", missing).await, Err(LeaseError::Validation(_))));

        let failure = TaskFailure::new("E", json!({"path": "/tmp"}), "boom");
        let task = manager.abort("t1", failure.clone()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Aborted);
        assert_eq!(task.errors, vec![failure]);
    }

    #[tokio::test]
    async fn terminal_tasks_reject_every_transition() {
        let (manager, _) = manager();
        running(&manager, "t1", "w1").await;
        let done = manager.complete("t1").await.unwrap();

        let failure = TaskFailure::new("E", json!([]), "");
        let results = vec![
            manager.claim("t1", "w1", None).await,
            manager.heartbeat("t1", "w1", None, None).await,
            manager.yield_task("t1").await,
            manager.cancel("t1").await,
            manager.complete("t1").await,
            manager.abort("t1", failure).await,
        ];
        for result in results {
            assert!(matches!(
                result,
                Err(LeaseError::InvalidState { status: TaskStatus::Completed, .. })
            ));
        }
        assert_eq!(manager.store.get("t1").await.unwrap().unwrap(), done);
    }

    #[tokio::test]
    async fn claim_batch_of_zero_is_empty() {
        let (manager, _) = manager();
        manager.add(NewTask::new("t1", "q", json!({}))).await.unwrap();
        assert!(manager.claim_batch("q", 0, "w1", None).await.unwrap().is_empty());
        assert_eq!(manager.claim_batch("q", 5, "w1", None).await.unwrap().len(), 1);
        assert!(manager.claim_batch("q", 5, "w2", None).await.unwrap().is_empty());
    }
}
