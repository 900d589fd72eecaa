use std::time::Duration;

use secrecy::SecretString;
use tasklease_core::config::{ConfigError, env_or};

pub const MEMORY_DATABASE: &str = ":memory:";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_POOL_SIZE: usize = 16;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to open the store.
///
/// With `host` unset, `database` is a local file path (or `:memory:`).
/// With `host` set, `database` is ignored and the remote endpoint is used.
#[derive(Debug)]
pub struct StoreConfig {
    pub host: Option<String>,
    pub port: u16,
    pub database: String,
    pub auth_token: Option<SecretString>,
    pub pool_size: usize,
    /// How long a local connection waits for the write lock.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            database: path.into(),
            auth_token: None,
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn memory() -> Self {
        Self::local(MEMORY_DATABASE)
    }

    pub fn remote(host: impl Into<String>, auth_token: SecretString) -> Self {
        Self {
            host: Some(host.into()),
            auth_token: Some(auth_token),
            ..Self::local(MEMORY_DATABASE)
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Read `TASKLEASE_DB_*` variables. Unset values keep their defaults and
    /// an unset database name means `tasklease.db` in the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database: String = env_or("TASKLEASE_DB_NAME", "tasklease.db".to_string())?;
        let host = std::env::var("TASKLEASE_DB_HOST")
            .ok()
            .filter(|host| !host.trim().is_empty());
        let auth_token = std::env::var("TASKLEASE_DB_AUTH_TOKEN")
            .ok()
            .map(SecretString::from);

        let pool_size = env_or("TASKLEASE_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKLEASE_DB_POOL_SIZE".into(),
                message: "must be positive".into(),
            });
        }
        let busy_ms = env_or(
            "TASKLEASE_DB_BUSY_TIMEOUT_MS",
            DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        )?;

        Ok(Self {
            host,
            port: env_or("TASKLEASE_DB_PORT", DEFAULT_PORT)?,
            database,
            auth_token,
            pool_size,
            busy_timeout: Duration::from_millis(busy_ms),
        })
    }

    pub fn is_memory(&self) -> bool {
        self.host.is_none() && self.database == MEMORY_DATABASE
    }

    /// Remote endpoint URL. A host that already carries a scheme is used as is.
    pub fn remote_url(&self) -> Option<String> {
        self.host.as_ref().map(|host| {
            if host.contains("://") {
                host.clone()
            } else {
                format!("http://{host}:{}", self.port)
            }
        })
    }

    /// Memory databases are per-connection, so they get exactly one.
    pub(crate) fn effective_pool_size(&self) -> usize {
        if self.is_memory() { 1 } else { self.pool_size.max(1) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_forces_single_connection() {
        let config = StoreConfig::memory().with_pool_size(8);
        assert!(config.is_memory());
        assert_eq!(config.effective_pool_size(), 1);
        assert_eq!(StoreConfig::local("q.db").effective_pool_size(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn remote_url_adds_scheme_and_port() {
        let bare = StoreConfig::remote("db.internal", SecretString::from("t"));
        assert_eq!(bare.remote_url().as_deref(), Some("http://db.internal:8080"));
        assert!(!bare.is_memory());

        let full = StoreConfig::remote("libsql://q.turso.io", SecretString::from("t"));
        assert_eq!(full.remote_url().as_deref(), Some("libsql://q.turso.io"));
    }
}
