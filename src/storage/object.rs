//! Decoded git objects.
//!
//! A [`RawObject`] is what the pack and loose readers hand back: the object
//! kind, its id and the fully inflated (and delta-resolved) payload. The
//! typed views live in [`commit`](super::commit) and [`tree`](super::tree).

use git2::Oid;

use super::commit::CommitInfo;
use super::errors::{StorageError, StorageResult};
use super::tree::{parse_tree, TreeEntryInfo};
use super::types::ObjectKind;

/// An inflated object payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub oid: Oid,
    pub data: Vec<u8>,
}

impl RawObject {
    /// Build an object and compute its id from the payload.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> StorageResult<Self> {
        let oid = Oid::hash_object(kind.to_git2(), &data)?;
        Ok(Self { kind, oid, data })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn expect_kind(&self, expected: ObjectKind) -> StorageResult<()> {
        if self.kind != expected {
            return Err(StorageError::UnexpectedObjectType {
                oid: self.oid,
                expected: expected.as_str(),
                found: self.kind.as_str(),
            });
        }
        Ok(())
    }

    /// Parse the payload as a commit.
    pub fn to_commit(&self) -> StorageResult<CommitInfo> {
        self.expect_kind(ObjectKind::Commit)?;
        CommitInfo::parse(self.oid, &self.data)
    }

    /// Parse the payload as a tree.
    pub fn to_tree(&self) -> StorageResult<Vec<TreeEntryInfo>> {
        self.expect_kind(ObjectKind::Tree)?;
        parse_tree(self.oid, &self.data)
    }

    /// Take the payload of a blob.
    pub fn into_blob(self) -> StorageResult<Vec<u8>> {
        self.expect_kind(ObjectKind::Blob)?;
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_git() {
        let obj = RawObject::new(ObjectKind::Blob, b"hello\n".to_vec()).unwrap();
        assert_eq!(obj.oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(obj.size(), 6);
    }

    #[test]
    fn test_wrong_kind() {
        let obj = RawObject::new(ObjectKind::Blob, b"x".to_vec()).unwrap();
        let err = obj.to_commit().unwrap_err();
        assert!(matches!(err, StorageError::UnexpectedObjectType { expected: "commit", .. }));
    }
}
