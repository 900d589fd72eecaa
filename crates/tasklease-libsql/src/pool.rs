//! Bounded connection pool.
//!
//! A semaphore caps how many connections are checked out; returned
//! connections go back to an idle list for reuse. A connection is handed
//! to exactly one operation at a time, so each can run its own transaction.

use std::ops::Deref;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use libsql::{Connection, Database};
use tasklease_core::StoreError;
use tokio::sync::{Semaphore, SemaphorePermit};

pub(crate) struct ConnectionPool {
    db: Database,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    /// Applied to every new local connection; `None` for remote databases.
    busy_timeout: Option<Duration>,
}

impl ConnectionPool {
    /// `seed` is kept as the first idle connection. For `:memory:` databases
    /// it is the only connection that sees the schema.
    pub(crate) fn new(
        db: Database,
        seed: Connection,
        size: usize,
        busy_timeout: Option<Duration>,
    ) -> Self {
        Self {
            db,
            idle: Mutex::new(vec![seed]),
            permits: Semaphore::new(size.max(1)),
            busy_timeout,
        }
    }

    pub(crate) async fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| StoreError::Connection(format!("pool closed: {e}")))?;

        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        Ok(PooledConnection {
            conn,
            pool: self,
            _permit: permit,
        })
    }

    async fn connect(&self) -> Result<Connection, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        if let Some(timeout) = self.busy_timeout {
            configure_local(&conn, timeout).await?;
        }
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

/// Set the lock wait for a local connection.
pub(crate) async fn configure_local(conn: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
    // PRAGMA busy_timeout reports the new value as a row.
    conn.query(
        &format!("PRAGMA busy_timeout = {}", busy_timeout.as_millis()),
        (),
    )
    .await
    .map_err(|e| StoreError::Connection(format!("Failed to set busy_timeout: {e}")))?;
    Ok(())
}

/// A checked-out connection. Dropping it returns the connection to the pool.
pub(crate) struct PooledConnection<'a> {
    conn: Connection,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        // Connection handles are shared; the permit is released after this.
        self.pool.release(self.conn.clone());
    }
}
