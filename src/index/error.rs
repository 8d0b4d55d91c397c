//! Index errors.

use thiserror::Error;

use crate::storage::StorageError;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid hash size: {0}, expecting 40 bytes")]
    InvalidHashSize(usize),

    #[error("invalid hash in key: {0}")]
    InvalidHash(String),

    #[error("truncated key: can't read {0}")]
    Truncated(&'static str),

    #[error("key compression error: {0}")]
    Compression(#[source] std::io::Error),

    #[error("row should have {expected} columns, has: {found}")]
    RowLength { expected: usize, found: usize },

    #[error("row column {column} should have type {expected}, has: {found}")]
    ColumnType {
        column: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column {column} not found for table {table}")]
    ColumnNotFound { column: String, table: String },

    #[error("cursor is not positioned on a row")]
    NotPositioned,

    #[error("key does not resolve in repository {repository}: {reason}")]
    Unresolved { repository: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
