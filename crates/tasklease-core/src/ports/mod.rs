//! Ports - 抽象化レイヤー
//!
//! ストア・時刻・ID 生成を trait として切り出し、実装を差し替え可能にします。
//!
//! # 設計原則
//! - TaskStore が唯一の正本（source of truth）
//! - 排他制御はすべてストアの条件付き更新に委ねる（プロセス内ロックなし）
//! - 時刻は Clock 経由でのみ取得する（テストで固定できるように）

pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
