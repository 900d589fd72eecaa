//! TaskStore port - タスクの正本（source of truth）
//!
//! # 実装
//! - `impls::InMemoryTaskStore`: テスト・開発用
//! - `tasklease-libsql` クレートの `LibSqlTaskStore`: 本番用（libSQL / SQLite）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{StatusCounts, Task, TaskFilter, Transition};
use crate::error::StoreError;

/// TaskStore は全タスクの状態を保持する
///
/// # 設計原則
/// - 状態を変える操作はすべて「条件チェック + 更新」を一つの原子的操作として行う
/// - 条件不成立は `Ok(None)` / 空の Vec で返し、エラーにはしない
/// - エラーはストア自体の障害のみ
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert unless a task with the same id exists. `None` means it existed.
    async fn insert_if_absent(&self, task: Task) -> Result<Option<Task>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Tasks matching `filter`, highest priority first, then oldest first.
    /// `filter.limit` is already resolved by the caller.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// Apply `transition` if its guard holds at the moment of mutation.
    /// `None` when the task is missing or the guard failed.
    async fn conditional_update(
        &self,
        id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError>;

    /// Lease up to `limit` ready tasks of `queue` in one atomic step, ordered
    /// by priority descending, created ascending, insertion order.
    async fn claim_top_n(
        &self,
        queue: &str,
        limit: usize,
        worker: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;

    /// Running tasks with `deadline < now` and no pending yield go back to
    /// ready with a timeout history entry.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    /// Running tasks whose last history entry is a yield go back to ready.
    async fn release_yielded(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    async fn counts_by_status(&self, queue: Option<&str>) -> Result<StatusCounts, StoreError>;
}
