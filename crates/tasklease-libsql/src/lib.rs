//! tasklease-libsql
//!
//! libSQL / SQLite implementation of [`tasklease_core::ports::TaskStore`].
//!
//! - local database file (multi-connection pool, WAL)
//! - `:memory:` database for tests (single shared connection)
//! - remote sqld / Turso endpoint when a host is configured

mod config;
mod migrations;
mod pool;
mod row;
mod store;

pub use config::StoreConfig;
pub use migrations::run_migrations;
pub use store::LibSqlTaskStore;
