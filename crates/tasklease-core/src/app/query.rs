//! QueryService - 読み取り専用の参照

use std::sync::Arc;

use crate::config::LeaseConfig;
use crate::domain::{StatusCounts, Task, TaskFilter};
use crate::error::LeaseError;
use crate::ports::TaskStore;

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn TaskStore>,
    config: LeaseConfig,
}

impl QueryService {
    pub fn new(store: Arc<dyn TaskStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    pub async fn get(&self, id: &str) -> Result<Task, LeaseError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LeaseError::NotFound(id.to_string()))
    }

    /// Tasks matching every predicate in `filter`, highest priority first.
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, LeaseError> {
        let limit = match filter.limit {
            Some(0) => return Err(LeaseError::validation("limit must be positive")),
            Some(limit) => limit.min(self.config.max_list_limit),
            None => self.config.default_list_limit,
        };
        let resolved = TaskFilter {
            limit: Some(limit),
            ..filter.clone()
        };
        Ok(self.store.list(&resolved).await?)
    }

    pub async fn counts(&self, queue: Option<&str>) -> Result<StatusCounts, LeaseError> {
        Ok(self.store.counts_by_status(queue).await?)
    }
}
