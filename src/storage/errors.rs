//! Storage layer error types
//!
//! Everything that can go wrong while reading the object store: libgit2
//! failures, filesystem errors and corrupt pack/index/object bytes.

use std::path::PathBuf;

use git2::Oid;
use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the repository id is not registered in the pool
    #[error("repository id {0} not found in the pool")]
    RepositoryNotFound(String),

    /// the repository has no readable object directory
    #[error("object directory not found: {0}")]
    ObjectsDirNotFound(PathBuf),

    /// the object is neither packed nor loose
    #[error("object hash {0} is not in repository")]
    HashNotInIndex(Oid),

    /// the object could not be read from the store
    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    /// a pack index file could not be parsed
    #[error("corrupt pack index {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// a packfile entry could not be parsed
    #[error("corrupt packfile {path} at offset {offset}: {reason}")]
    CorruptPack {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// zlib stream could not be inflated
    #[error("inflate error: {0}")]
    Inflate(String),

    /// delta instructions could not be applied
    #[error("delta error: {0}")]
    Delta(String),

    /// object bytes don't follow the git object format
    #[error("malformed {kind} object {oid}: {reason}")]
    MalformedObject {
        kind: &'static str,
        oid: Oid,
        reason: String,
    },

    /// the object exists but has another kind
    #[error("object {oid} is a {found}, expecting {expected}")]
    UnexpectedObjectType {
        oid: Oid,
        expected: &'static str,
        found: &'static str,
    },
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::RepositoryNotFound(_)
            | StorageError::ObjectsDirNotFound(_)
            | StorageError::HashNotInIndex(_)
            | StorageError::ObjectNotFound(_) => true,
            StorageError::Git(e) => e.code() == git2::ErrorCode::NotFound,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// check if this error comes from unreadable or damaged data
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptIndex { .. }
                | StorageError::CorruptPack { .. }
                | StorageError::Inflate(_)
                | StorageError::Delta(_)
                | StorageError::MalformedObject { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::HashNotInIndex(Oid::zero());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_corrupt());

        let corrupt = StorageError::CorruptPack {
            path: PathBuf::from("pack-1.pack"),
            offset: 12,
            reason: "truncated".into(),
        };
        assert!(!corrupt.is_not_found());
        assert!(corrupt.is_corrupt());

        let git = StorageError::Git(git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Odb,
            "missing",
        ));
        assert!(git.is_not_found());
    }

    #[test]
    fn test_pool_message() {
        let err = StorageError::RepositoryNotFound("foo".into());
        assert_eq!(err.to_string(), "repository id foo not found in the pool");
    }
}
