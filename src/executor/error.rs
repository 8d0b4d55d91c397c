//! Query execution errors.

use thiserror::Error;

use crate::index::IndexError;
use crate::sql::ParseError;
use crate::storage::StorageError;

/// Result type for query execution.
pub type ExecuteResult<T> = Result<T, ExecuteError>;

/// Query execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("query canceled")]
    Canceled,

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl ExecuteError {
    /// Errors that a session with `skip_git_errors` logs and moves past:
    /// anything the object store reports.
    pub fn is_skippable(&self) -> bool {
        match self {
            ExecuteError::Storage(_) => true,
            ExecuteError::Index(IndexError::Storage(_)) => true,
            _ => false,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ExecuteError::Canceled)
    }
}

impl From<git2::Error> for ExecuteError {
    fn from(e: git2::Error) -> Self {
        ExecuteError::Storage(StorageError::Git(e))
    }
}
