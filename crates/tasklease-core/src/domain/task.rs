//! Task record: identity, payload, lease state and append-only logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaskStatus;

/// Request to add a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: String,
    pub queue: String,
    pub spec: Value,
    pub priority: i32,
}

impl NewTask {
    pub fn new(id: impl Into<String>, queue: impl Into<String>, spec: Value) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            spec,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Kind of a lease history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Assignment,
    Yield,
    Timeout,
}

/// One lease event. `progress` is absent on assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub worker: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

impl HistoryEntry {
    pub fn assignment(worker: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            kind: HistoryKind::Assignment,
            worker: worker.into(),
            time,
            progress: None,
        }
    }
}

/// Failure recorded by abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub code: String,
    pub args: Value,
    pub description: String,
}

impl TaskFailure {
    pub fn new(code: impl Into<String>, args: Value, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            args,
            description: description.into(),
        }
    }
}

/// A task as held by the store.
///
/// Invariants:
/// - `owner` and `deadline` are `Some` exactly when `status == Running`.
/// - `progress` is within `[0, 1]`.
/// - `errors` and `history` only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub queue: String,
    pub spec: Value,
    pub priority: i32,
    pub status: TaskStatus,
    pub progress: f32,
    pub owner: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub errors: Vec<TaskFailure>,
    pub history: Vec<HistoryEntry>,
}

impl Task {
    pub fn from_new(new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            queue: new.queue,
            spec: new.spec,
            priority: new.priority,
            status: TaskStatus::Ready,
            progress: 0.0,
            owner: None,
            deadline: None,
            created: now,
            updated: now,
            errors: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Running task whose owner asked to give the lease back.
    pub fn is_yield_pending(&self) -> bool {
        self.status == TaskStatus::Running
            && self
                .history
                .last()
                .is_some_and(|entry| entry.kind == HistoryKind::Yield)
    }

    /// Running task whose lease ran out and which is not already being yielded.
    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running
            && !self.is_yield_pending()
            && self.deadline.is_some_and(|deadline| deadline < now)
    }

    /// Put the task back to `Ready`. A timeout entry is appended unless the
    /// release resolves a yield, which already has its own entry.
    pub(crate) fn release(&mut self, now: DateTime<Utc>) {
        if !self.is_yield_pending() {
            self.history.push(HistoryEntry {
                kind: HistoryKind::Timeout,
                worker: self.owner.clone().unwrap_or_default(),
                time: now,
                progress: Some(self.progress),
            });
        }
        self.status = TaskStatus::Ready;
        self.owner = None;
        self.deadline = None;
        self.progress = 0.0;
        self.updated = now;
    }
}
