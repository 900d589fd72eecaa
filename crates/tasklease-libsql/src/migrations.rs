//! Version-tracked schema migrations.
//!
//! `run_migrations()` reads the highest applied version from `_migrations`
//! and applies only the newer steps, in order.

use libsql::Connection;
use tasklease_core::StoreError;
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "tasks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                queue TEXT NOT NULL,
                spec TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'ready'
                    CHECK (status IN ('ready', 'running', 'cancelled', 'completed', 'aborted')),
                progress REAL NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 1),
                owner TEXT,
                deadline TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                errors TEXT NOT NULL DEFAULT '[]',
                history TEXT NOT NULL DEFAULT '[]',
                CHECK ((status = 'running') = (owner IS NOT NULL AND deadline IS NOT NULL)),
                CHECK (status = 'running' OR (owner IS NULL AND deadline IS NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_claim
                ON tasks(queue, status, priority DESC, created, seq);
            CREATE INDEX IF NOT EXISTS idx_tasks_sweep ON tasks(status, deadline);
        "#,
    },
    Migration {
        version: 2,
        name: "owner_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner) WHERE owner IS NOT NULL;
        "#,
    },
];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Query(format!("Failed to create _migrations table: {e}")))?;

    let applied = current_version(conn).await?;
    let mut latest = applied;

    for migration in MIGRATIONS {
        if migration.version > applied {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                StoreError::Query(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
            latest = migration.version;
        }
    }

    info!(version = latest, "Database migrations complete");
    Ok(())
}

/// Highest applied migration version, or 0 if none.
pub(crate) async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Query(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| StoreError::Query(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| StoreError::Decode(format!("Failed to parse migration version: {e}"))),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| StoreError::Query(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> (libsql::Database, Connection) {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        (db, conn)
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (_db, conn) = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let latest = MIGRATIONS.last().unwrap().version;
        assert_eq!(current_version(&conn).await.unwrap(), latest);
    }

    #[tokio::test]
    async fn schema_rejects_running_without_owner() {
        let (_db, conn) = memory_conn().await;
        run_migrations(&conn).await.unwrap();

        let result = conn
            .execute(
                "INSERT INTO tasks (id, queue, spec, status, created, updated)
                 VALUES ('t1', 'q', '{}', 'running', 'x', 'x')",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
