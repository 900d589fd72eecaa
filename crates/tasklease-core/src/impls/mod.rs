//! Impls - 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト用の正本
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します：
//! - `tasklease-libsql`: LibSqlTaskStore

pub mod memory;

pub use self::memory::InMemoryTaskStore;
