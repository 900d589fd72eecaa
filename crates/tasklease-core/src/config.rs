//! Lease and sweeper configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const DEFAULT_MAX_LIST_LIMIT: usize = 1000;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Read `key` from the environment, falling back to `default` when unset.
pub fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Lease length when a claim or heartbeat does not give one.
    pub default_lease: Duration,
    /// List size when the filter does not give one.
    pub default_list_limit: usize,
    pub max_list_limit: usize,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease: DEFAULT_LEASE,
            default_list_limit: DEFAULT_LIST_LIMIT,
            max_list_limit: DEFAULT_MAX_LIST_LIMIT,
        }
    }
}

impl LeaseConfig {
    /// `TASKLEASE_DEFAULT_LEASE_SECS`, `TASKLEASE_MAX_LIST_LIMIT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let lease_secs = env_or("TASKLEASE_DEFAULT_LEASE_SECS", defaults.default_lease.as_secs())?;
        if lease_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKLEASE_DEFAULT_LEASE_SECS".into(),
                message: "must be positive".into(),
            });
        }
        Ok(Self {
            default_lease: Duration::from_secs(lease_secs),
            max_list_limit: env_or("TASKLEASE_MAX_LIST_LIMIT", defaults.max_list_limit)?,
            ..defaults
        })
    }
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SweeperConfig {
    /// `TASKLEASE_SWEEP_INTERVAL_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let secs = env_or("TASKLEASE_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL.as_secs())?;
        if secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKLEASE_SWEEP_INTERVAL_SECS".into(),
                message: "must be positive".into(),
            });
        }
        Ok(Self {
            interval: Duration::from_secs(secs),
        })
    }
}
