//! QueueBuilder - キューの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use crate::app::{LeaseManager, QueryService, Sweeper};
use crate::config::{LeaseConfig, SweeperConfig};
use crate::ports::{Clock, SystemClock, TaskStore};

/// QueueBuilder はストア・時計・設定から TaskQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .store(Arc::new(InMemoryTaskStore::new()))
///     .build()?;
/// queue.lease().add(NewTask::new("t1", "default", json!({}))).await?;
/// ```
///
/// # Fail-fast 設計
/// - store() が呼ばれていなければ build() で BuildError を返す
/// - clock は省略時 SystemClock
pub struct QueueBuilder {
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    lease_config: LeaseConfig,
    sweeper_config: SweeperConfig,
}

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No task store configured. Call `store()` before `build()`.")]
    MissingStore,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: None,
            lease_config: LeaseConfig::default(),
            sweeper_config: SweeperConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn lease_config(mut self, config: LeaseConfig) -> Self {
        self.lease_config = config;
        self
    }

    pub fn sweeper_config(mut self, config: SweeperConfig) -> Self {
        self.sweeper_config = config;
        self
    }

    pub fn build(self) -> Result<TaskQueue, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(TaskQueue {
            lease: LeaseManager::new(store.clone(), clock.clone(), self.lease_config.clone()),
            query: QueryService::new(store.clone(), self.lease_config),
            sweeper: Sweeper::new(store, clock, self.sweeper_config),
        })
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// TaskQueue は一つのストアを共有する操作群のまとまり
#[derive(Clone)]
pub struct TaskQueue {
    lease: LeaseManager,
    query: QueryService,
    sweeper: Sweeper,
}

impl TaskQueue {
    pub fn lease(&self) -> &LeaseManager {
        &self.lease
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }
}
