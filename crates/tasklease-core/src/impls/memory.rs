//! In-memory task store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{StatusCounts, Task, TaskFilter, TaskStatus, Transition};
use crate::error::StoreError;
use crate::ports::TaskStore;

/// A task plus its insertion sequence, the final ordering tie-break.
#[derive(Debug, Clone)]
struct StoredTask {
    seq: u64,
    task: Task,
}

/// Claim order: priority descending, created ascending, insertion order.
fn claim_order(a: &StoredTask, b: &StoredTask) -> Ordering {
    b.task
        .priority
        .cmp(&a.task.priority)
        .then_with(|| a.task.created.cmp(&b.task.created))
        .then_with(|| a.seq.cmp(&b.seq))
}

#[derive(Default)]
struct InMemoryState {
    tasks: HashMap<String, StoredTask>,
    next_seq: u64,
}

impl InMemoryState {
    fn sorted_matching<F>(&mut self, pred: F) -> Vec<&mut StoredTask>
    where
        F: Fn(&Task) -> bool,
    {
        let mut matching: Vec<&mut StoredTask> = self
            .tasks
            .values_mut()
            .filter(|stored| pred(&stored.task))
            .collect();
        matching.sort_by(|a, b| claim_order(a, b));
        matching
    }
}

/// Task store backed by a `HashMap` behind a single async mutex.
///
/// Every operation holds the lock for its whole check-and-mutate step, which
/// gives the same atomicity as a conditional `UPDATE` in a database.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_if_absent(&self, task: Task) -> Result<Option<Task>, StoreError> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Ok(None);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.insert(
            task.id.clone(),
            StoredTask {
                seq,
                task: task.clone(),
            },
        );
        Ok(Some(task))
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(id).map(|stored| stored.task.clone()))
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut state = self.state.lock().await;
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(state
            .sorted_matching(|task| filter.matches(task))
            .into_iter()
            .take(limit)
            .map(|stored| stored.task.clone())
            .collect())
    }

    async fn conditional_update(
        &self,
        id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.tasks.get_mut(id) else {
            return Ok(None);
        };
        if !transition.permits(&stored.task) {
            return Ok(None);
        }
        transition.apply(&mut stored.task, now);
        Ok(Some(stored.task.clone()))
    }

    async fn claim_top_n(
        &self,
        queue: &str,
        limit: usize,
        worker: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let claim = Transition::Claim {
            worker: worker.to_string(),
            deadline,
        };
        let mut state = self.state.lock().await;
        let mut claimed = Vec::new();
        for stored in state
            .sorted_matching(|task| task.queue == queue && task.status == TaskStatus::Ready)
            .into_iter()
            .take(limit)
        {
            claim.apply(&mut stored.task, now);
            claimed.push(stored.task.clone());
        }
        Ok(claimed)
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let mut state = self.state.lock().await;
        let mut reclaimed = Vec::new();
        for stored in state.sorted_matching(|task| task.is_lease_expired(now)) {
            stored.task.release(now);
            reclaimed.push(stored.task.clone());
        }
        Ok(reclaimed)
    }

    async fn release_yielded(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let mut state = self.state.lock().await;
        let mut released = Vec::new();
        for stored in state.sorted_matching(Task::is_yield_pending) {
            stored.task.release(now);
            released.push(stored.task.clone());
        }
        Ok(released)
    }

    async fn counts_by_status(&self, queue: Option<&str>) -> Result<StatusCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for stored in state.tasks.values() {
            if queue.is_none_or(|queue| stored.task.queue == queue) {
                counts.add(stored.task.status, 1);
            }
        }
        Ok(counts)
    }
}
