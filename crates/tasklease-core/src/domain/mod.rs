//! Domain model (tasks, statuses, transitions, filters).

pub mod filter;
pub mod status;
pub mod task;
pub mod transition;

pub use filter::{StatusCounts, TaskFilter};
pub use status::TaskStatus;
pub use task::{HistoryEntry, HistoryKind, NewTask, Task, TaskFailure};
pub use transition::Transition;
