//! Lease transitions: the guard each one needs and the mutation it makes.
//!
//! The in-memory store evaluates `permits` and `apply` under its lock. The
//! libSQL store encodes the same guard in the `WHERE` clause of one `UPDATE`.

use chrono::{DateTime, Utc};

use super::{HistoryEntry, HistoryKind, Task, TaskFailure, TaskStatus};
use crate::error::LeaseError;

pub const NOT_OWNER_MESSAGE: &str = "Only owner can extend the heartbeat.";

/// Conditional mutation of a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// ready -> running
    Claim {
        worker: String,
        deadline: DateTime<Utc>,
    },
    /// running -> running, owner only
    Heartbeat {
        worker: String,
        deadline: DateTime<Utc>,
        progress: Option<f32>,
    },
    /// Records the intent to give the lease back; the sweeper resolves it.
    Yield,
    /// ready | running -> cancelled
    Cancel,
    /// running -> completed
    Complete,
    /// running -> aborted
    Abort { failure: TaskFailure },
}

impl Transition {
    pub fn operation(&self) -> &'static str {
        match self {
            Transition::Claim { .. } => "claim",
            Transition::Heartbeat { .. } => "heartbeat",
            Transition::Yield => "yield",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
            Transition::Abort { .. } => "abort",
        }
    }

    /// Does the guard hold on `task` as it is right now?
    pub fn permits(&self, task: &Task) -> bool {
        match self {
            Transition::Claim { .. } => task.status == TaskStatus::Ready,
            Transition::Heartbeat { worker, .. } => {
                task.status == TaskStatus::Running && task.owner.as_deref() == Some(worker.as_str())
            }
            Transition::Yield | Transition::Complete | Transition::Abort { .. } => {
                task.status == TaskStatus::Running
            }
            Transition::Cancel => matches!(task.status, TaskStatus::Ready | TaskStatus::Running),
        }
    }

    /// Apply the mutation. Callers check `permits` first.
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) {
        match self {
            Transition::Claim { worker, deadline } => {
                task.status = TaskStatus::Running;
                task.owner = Some(worker.clone());
                task.deadline = Some(*deadline);
                task.progress = 0.0;
                task.history.push(HistoryEntry::assignment(worker.clone(), now));
            }
            Transition::Heartbeat {
                deadline, progress, ..
            } => {
                task.deadline = Some(*deadline);
                if let Some(progress) = progress {
                    task.progress = *progress;
                }
            }
            Transition::Yield => {
                task.history.push(HistoryEntry {
                    kind: HistoryKind::Yield,
                    worker: task.owner.clone().unwrap_or_default(),
                    time: now,
                    progress: Some(task.progress),
                });
            }
            Transition::Cancel => finish(task, TaskStatus::Cancelled),
            Transition::Complete => finish(task, TaskStatus::Completed),
            Transition::Abort { failure } => {
                finish(task, TaskStatus::Aborted);
                task.errors.push(failure.clone());
            }
        }
        task.updated = now;
    }

    /// Error to report when the guard did not hold on `task`.
    pub fn rejection(&self, task: &Task) -> LeaseError {
        if let Transition::Heartbeat { worker, .. } = self
            && task.status == TaskStatus::Running
            && task.owner.as_deref() != Some(worker.as_str())
        {
            return LeaseError::validation(NOT_OWNER_MESSAGE);
        }
        LeaseError::InvalidState {
            id: task.id.clone(),
            operation: self.operation(),
            status: task.status,
        }
    }
}

fn finish(task: &mut Task, status: TaskStatus) {
    task.status = status;
    task.owner = None;
    task.deadline = None;
}
