use serde::{Deserialize, Serialize};

use super::{Task, TaskStatus};

/// Conjunction of optional predicates for listing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub queue: Option<String>,
    pub worker: Option<String>,
    /// Upper bound on returned tasks. `None` uses the configured default.
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Does `task` satisfy every predicate that is set?
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status == status)
            && self.queue.as_deref().is_none_or(|queue| task.queue == queue)
            && self
                .worker
                .as_deref()
                .is_none_or(|worker| task.owner.as_deref() == Some(worker))
    }
}

/// Number of tasks per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ready: usize,
    pub running: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub aborted: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: TaskStatus, n: usize) {
        match status {
            TaskStatus::Ready => self.ready += n,
            TaskStatus::Running => self.running += n,
            TaskStatus::Cancelled => self.cancelled += n,
            TaskStatus::Completed => self.completed += n,
            TaskStatus::Aborted => self.aborted += n,
        }
    }

    pub fn total(&self) -> usize {
        self.ready + self.running + self.cancelled + self.completed + self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let task = Task::from_new(NewTask::new("t1", "q", json!({})), Utc::now());
        assert!(TaskFilter::new().matches(&task));
    }

    #[test]
    fn predicates_are_conjunctive() {
        let mut task = Task::from_new(NewTask::new("t1", "q", json!({})), Utc::now());
        task.status = TaskStatus::Running;
        task.owner = Some("w1".into());

        assert!(TaskFilter::new().queue("q").worker("w1").matches(&task));
        assert!(!TaskFilter::new().queue("q").worker("w2").matches(&task));
        assert!(!TaskFilter::new().status(TaskStatus::Ready).queue("q").matches(&task));
    }

    #[test]
    fn counts_accumulate_per_status() {
        let mut counts = StatusCounts::default();
        counts.add(TaskStatus::Ready, 2);
        counts.add(TaskStatus::Aborted, 1);
        assert_eq!(counts.ready, 2);
        assert_eq!(counts.aborted, 1);
        assert_eq!(counts.total(), 3);
    }
}
