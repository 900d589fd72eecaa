//! Errors - エラー型と分類

use thiserror::Error;

use crate::domain::TaskStatus;

/// ErrorKind は失敗の運用分類
///
/// - Permanent: 呼び出し側の入力や状態に起因（同じ呼び出しを繰り返しても無意味）
/// - Infrastructure: ストア障害（呼び出し側が判断して再試行できる）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Infrastructure,
}

/// Failure raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be obtained or the transaction could not start.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A statement failed while executing.
    #[error("store query failed: {0}")]
    Query(String),

    /// A row could not be converted into a task.
    #[error("store row decode failed: {0}")]
    Decode(String),
}

/// Error returned by every queue operation.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("task already exists: {0}")]
    DuplicateKey(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("cannot {operation} task {id} in status {status}")]
    InvalidState {
        id: String,
        operation: &'static str,
        status: TaskStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LeaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaseError::StoreUnavailable(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Permanent,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LeaseError::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_infrastructure() {
        let err = LeaseError::from(StoreError::Connection("refused".into()));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.to_string(), "store unavailable: store connection failed: refused");
    }

    #[test]
    fn invalid_state_names_operation_and_status() {
        let err = LeaseError::InvalidState {
            id: "t1".into(),
            operation: "complete",
            status: TaskStatus::Ready,
        };
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(err.to_string(), "cannot complete task t1 in status ready");
    }
}
