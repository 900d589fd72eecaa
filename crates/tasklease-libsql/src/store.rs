//! libSQL task store.
//!
//! Every mutation is a single `UPDATE ... WHERE <guard> RETURNING` run inside
//! its own `BEGIN IMMEDIATE` transaction, so the guard is evaluated while the
//! write lock is held and concurrent claimers can never pick the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{TransactionBehavior, Value};
use secrecy::ExposeSecret;
use tasklease_core::domain::{HistoryEntry, StatusCounts, Task, TaskFilter, TaskStatus, Transition};
use tasklease_core::ports::TaskStore;
use tasklease_core::StoreError;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::migrations;
use crate::pool::{self, ConnectionPool};
use crate::row::{collect_tasks, in_claim_order, json_value, text, time_value, TASK_COLUMNS};

/// `running` with no yield waiting to be resolved.
const NO_PENDING_YIELD: &str = "COALESCE(json_extract(history, '$[#-1].kind'), '') <> 'yield'";

pub struct LibSqlTaskStore {
    pool: ConnectionPool,
}

impl LibSqlTaskStore {
    /// Open the configured database and bring its schema up to date.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = match config.remote_url() {
            Some(url) => {
                let token = config
                    .auth_token
                    .as_ref()
                    .map(|token| token.expose_secret().to_string())
                    .unwrap_or_default();
                let db = libsql::Builder::new_remote(url.clone(), token)
                    .build()
                    .await
                    .map_err(|e| StoreError::Connection(format!("Failed to open remote database: {e}")))?;
                let store = Self::init(db, config.effective_pool_size(), None).await?;
                info!(url = %url, "Remote database opened");
                store
            }
            None => {
                let db = libsql::Builder::new_local(&config.database)
                    .build()
                    .await
                    .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;
                let store =
                    Self::init(db, config.effective_pool_size(), Some(config.busy_timeout)).await?;
                info!(
                    path = %config.database,
                    pool_size = config.effective_pool_size(),
                    "Database opened"
                );
                store
            }
        };
        Ok(store)
    }

    /// Fresh in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::memory()).await
    }

    async fn init(
        db: libsql::Database,
        pool_size: usize,
        busy_timeout: Option<std::time::Duration>,
    ) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        if let Some(timeout) = busy_timeout {
            pool::configure_local(&conn, timeout).await?;
            // WAL lets readers proceed while a claim holds the write lock.
            // In-memory databases answer "memory" and keep going.
            conn.query("PRAGMA journal_mode = WAL", ())
                .await
                .map_err(|e| StoreError::Connection(format!("Failed to set journal_mode: {e}")))?;
        }
        migrations::run_migrations(&conn).await?;

        Ok(Self {
            pool: ConnectionPool::new(db, conn, pool_size, busy_timeout),
        })
    }

    /// Run one mutating statement in an immediate transaction and return the
    /// rows it reports.
    async fn write(
        &self,
        op: &'static str,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<(i64, Task)>, StoreError> {
        let conn = self.pool.acquire().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| StoreError::Connection(format!("{op}: begin: {e}")))?;

        match collect_tasks(tx.query(sql, params).await, op).await {
            Ok(tasks) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::Query(format!("{op}: commit: {e}")))?;
                Ok(tasks)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(op, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn read(
        &self,
        op: &'static str,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<(i64, Task)>, StoreError> {
        let conn = self.pool.acquire().await?;
        collect_tasks(conn.query(sql, params).await, op).await
    }

    fn single(rows: Vec<(i64, Task)>) -> Option<Task> {
        rows.into_iter().next().map(|(_, task)| task)
    }
}

/// Statement and parameters for one transition on task `?1`.
fn transition_statement(
    id: &str,
    transition: &Transition,
    now: DateTime<Utc>,
) -> Result<(String, Vec<Value>), StoreError> {
    let (set, guard, mut extra) = match transition {
        Transition::Claim { worker, deadline } => (
            "status = 'running', owner = ?3, deadline = ?4, progress = 0, \
             history = json_insert(history, '$[#]', json(?5))",
            "status = 'ready'".to_string(),
            vec![
                text(worker.as_str()),
                time_value(*deadline),
                json_value(&HistoryEntry::assignment(worker.as_str(), now))?,
            ],
        ),
        Transition::Heartbeat {
            worker,
            deadline,
            progress,
        } => (
            "deadline = ?4, progress = COALESCE(?5, progress)",
            "status = 'running' AND owner = ?3".to_string(),
            vec![
                text(worker.as_str()),
                time_value(*deadline),
                progress.map_or(Value::Null, |p| Value::Real(f64::from(p))),
            ],
        ),
        Transition::Yield => (
            "history = json_insert(history, '$[#]', json_object(\
                'kind', 'yield', 'worker', owner, 'time', ?2, 'progress', progress))",
            "status = 'running'".to_string(),
            vec![],
        ),
        Transition::Cancel => (
            "status = 'cancelled', owner = NULL, deadline = NULL",
            "status IN ('ready', 'running')".to_string(),
            vec![],
        ),
        Transition::Complete => (
            "status = 'completed', owner = NULL, deadline = NULL",
            "status = 'running'".to_string(),
            vec![],
        ),
        Transition::Abort { failure } => (
            "status = 'aborted', owner = NULL, deadline = NULL, \
             errors = json_insert(errors, '$[#]', json(?3))",
            "status = 'running'".to_string(),
            vec![json_value(failure)?],
        ),
    };

    let sql = format!(
        "UPDATE tasks SET {set}, updated = ?2 WHERE id = ?1 AND {guard} RETURNING {TASK_COLUMNS}"
    );
    let mut params = vec![text(id), time_value(now)];
    params.append(&mut extra);
    Ok((sql, params))
}

#[async_trait]
impl TaskStore for LibSqlTaskStore {
    async fn insert_if_absent(&self, task: Task) -> Result<Option<Task>, StoreError> {
        let sql = format!(
            "INSERT INTO tasks (id, queue, spec, priority, status, progress, created, updated, errors, history)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO NOTHING
             RETURNING {TASK_COLUMNS}"
        );
        let params = vec![
            text(task.id.as_str()),
            text(task.queue.as_str()),
            json_value(&task.spec)?,
            Value::Integer(i64::from(task.priority)),
            text(task.status.as_str()),
            Value::Real(f64::from(task.progress)),
            time_value(task.created),
            time_value(task.updated),
            json_value(&task.errors)?,
            json_value(&task.history)?,
        ];
        let inserted = Self::single(self.write("insert", &sql, params).await?);
        if inserted.is_none() {
            debug!(task_id = %task.id, "insert skipped, id exists");
        }
        Ok(inserted)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        Ok(Self::single(self.read("get", &sql, vec![text(id)]).await?))
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR queue = ?2)
               AND (?3 IS NULL OR owner = ?3)
             ORDER BY priority DESC, created ASC, seq ASC
             LIMIT ?4"
        );
        let optional = |value: Option<&str>| value.map_or(Value::Null, |v| text(v));
        let limit = filter
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let params = vec![
            optional(filter.status.map(TaskStatus::as_str)),
            optional(filter.queue.as_deref()),
            optional(filter.worker.as_deref()),
            Value::Integer(limit),
        ];
        let rows = self.read("list", &sql, params).await?;
        Ok(rows.into_iter().map(|(_, task)| task).collect())
    }

    async fn conditional_update(
        &self,
        id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        let (sql, params) = transition_statement(id, transition, now)?;
        Ok(Self::single(self.write(transition.operation(), &sql, params).await?))
    }

    async fn claim_top_n(
        &self,
        queue: &str,
        limit: usize,
        worker: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "UPDATE tasks
             SET status = 'running', owner = ?3, deadline = ?4, progress = 0, updated = ?5,
                 history = json_insert(history, '$[#]', json(?6))
             WHERE seq IN (
                 SELECT seq FROM tasks
                 WHERE queue = ?1 AND status = 'ready'
                 ORDER BY priority DESC, created ASC, seq ASC
                 LIMIT ?2
             )
             RETURNING {TASK_COLUMNS}"
        );
        let params = vec![
            text(queue),
            Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
            text(worker),
            time_value(deadline),
            time_value(now),
            json_value(&HistoryEntry::assignment(worker, now))?,
        ];
        Ok(in_claim_order(self.write("claim_batch", &sql, params).await?))
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "UPDATE tasks
             SET status = 'ready', owner = NULL, deadline = NULL, progress = 0, updated = ?1,
                 history = json_insert(history, '$[#]', json_object(
                     'kind', 'timeout', 'worker', owner, 'time', ?1, 'progress', progress))
             WHERE status = 'running' AND deadline < ?1 AND {NO_PENDING_YIELD}
             RETURNING {TASK_COLUMNS}"
        );
        Ok(in_claim_order(
            self.write("reclaim_expired", &sql, vec![time_value(now)]).await?,
        ))
    }

    async fn release_yielded(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "UPDATE tasks
             SET status = 'ready', owner = NULL, deadline = NULL, progress = 0, updated = ?1
             WHERE status = 'running' AND json_extract(history, '$[#-1].kind') = 'yield'
             RETURNING {TASK_COLUMNS}"
        );
        Ok(in_claim_order(
            self.write("release_yielded", &sql, vec![time_value(now)]).await?,
        ))
    }

    async fn counts_by_status(&self, queue: Option<&str>) -> Result<StatusCounts, StoreError> {
        let conn = self.pool.acquire().await?;
        let mut rows = conn
            .query(
                "SELECT status, COUNT(*) FROM tasks WHERE (?1 IS NULL OR queue = ?1) GROUP BY status",
                vec![queue.map_or(Value::Null, |q| text(q))],
            )
            .await
            .map_err(|e| StoreError::Query(format!("counts: {e}")))?;

        let mut counts = StatusCounts::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("counts: {e}")))?
        {
            let status: String = row
                .get(0)
                .map_err(|e| StoreError::Decode(format!("counts status: {e}")))?;
            let n: i64 = row
                .get(1)
                .map_err(|e| StoreError::Decode(format!("counts value: {e}")))?;
            let status = status.parse::<TaskStatus>().map_err(StoreError::Decode)?;
            counts.add(status, usize::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}
