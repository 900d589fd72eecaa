//! App - アプリケーション層
//!
//! ports を組み合わせてキューの操作を実装します。
//!
//! # 主要コンポーネント
//! - **LeaseManager**: add / claim / heartbeat / yield / cancel / complete / abort
//! - **Sweeper**: 期限切れ lease と yield の回収（バックグラウンド）
//! - **QueryService**: 読み取り専用の get / list / counts
//! - **QueueBuilder**: 上記をストア・時計・設定からワイヤリング

pub mod builder;
pub mod lease_manager;
pub mod query;
pub mod sweeper;

pub use self::builder::{BuildError, QueueBuilder, TaskQueue};
pub use self::lease_manager::LeaseManager;
pub use self::query::QueryService;
pub use self::sweeper::{SweepReport, Sweeper, SweeperHandle};
