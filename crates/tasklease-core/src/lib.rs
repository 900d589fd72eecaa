//! tasklease-core
//!
//! Lease-based durable task queue: many workers compete for tasks held in a
//! single store of record.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Task, TaskStatus, Transition, TaskFilter）
//! - **ports**: 抽象化レイヤー（TaskStore, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（LeaseManager, Sweeper, QueryService, builder）
//! - **impls**: 実装（InMemoryTaskStore, テスト・開発用）
//! - **config**: 設定（LeaseConfig, SweeperConfig）
//! - **error**: エラー型（LeaseError, StoreError）

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{LeaseManager, QueryService, QueueBuilder, Sweeper, TaskQueue};
pub use domain::{NewTask, Task, TaskFailure, TaskFilter, TaskStatus};
pub use error::{LeaseError, StoreError};
