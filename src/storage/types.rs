//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::fmt::Formatter;

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;

/// mode of a directory entry in a tree
pub const MODE_TREE: i32 = 0o040000;

/// mode of a gitlink (submodule) entry in a tree
pub const MODE_SUBMODULE: i32 = 0o160000;

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid
    pub fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a git object as stored in the object database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }

    /// parse the kind name used in loose object headers
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "commit" => Some(ObjectKind::Commit),
            "tree" => Some(ObjectKind::Tree),
            "blob" => Some(ObjectKind::Blob),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }

    pub fn from_git2(kind: git2::ObjectType) -> Option<Self> {
        match kind {
            git2::ObjectType::Commit => Some(ObjectKind::Commit),
            git2::ObjectType::Tree => Some(ObjectKind::Tree),
            git2::ObjectType::Blob => Some(ObjectKind::Blob),
            git2::ObjectType::Tag => Some(ObjectKind::Tag),
            _ => None,
        }
    }

    pub fn to_git2(self) -> git2::ObjectType {
        match self {
            ObjectKind::Commit => git2::ObjectType::Commit,
            ObjectKind::Tree => git2::ObjectType::Tree,
            ObjectKind::Blob => git2::ObjectType::Blob,
            ObjectKind::Tag => git2::ObjectType::Tag,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author or committer of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl Signature {
    pub(crate) fn from_git2(sig: &git2::Signature<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
            when: timestamp(sig.when().seconds()),
        }
    }
}

/// convert seconds since the epoch into a UTC timestamp
pub(crate) fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// octal representation of a tree entry mode, e.g. `100644`
pub fn mode_string(mode: i32) -> String {
    format!("{:06o}", mode)
}

/// A hash reference: name plus the object it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    pub name: String,
    pub target: Oid,
}

/// A configured remote with its URLs and fetch refspecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub urls: Vec<String>,
    pub fetch: Vec<String>,
}

impl RemoteInfo {
    /// number of rows this remote produces: one per url or refspec position
    pub fn row_count(&self) -> usize {
        self.urls.len().max(self.fetch.len())
    }

    /// url at `pos`, if any
    pub fn url(&self, pos: usize) -> Option<&str> {
        self.urls.get(pos).map(String::as_str)
    }

    /// fetch refspec at `pos`, clamped to the last configured one
    pub fn fetch_refspec(&self, pos: usize) -> Option<&str> {
        if self.fetch.is_empty() {
            return None;
        }
        let pos = pos.min(self.fetch.len() - 1);
        Some(self.fetch[pos].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(0o100644), "100644");
        assert_eq!(mode_string(MODE_TREE), "040000");
        assert_eq!(mode_string(MODE_SUBMODULE), "160000");
    }

    #[test]
    fn test_remote_positions() {
        let remote = RemoteInfo {
            name: "origin".into(),
            urls: vec!["git@host:a.git".into()],
            fetch: vec![
                "+refs/heads/*:refs/remotes/origin/*".into(),
                "+refs/tags/*:refs/tags/*".into(),
            ],
        };
        assert_eq!(remote.row_count(), 2);
        assert_eq!(remote.url(0), Some("git@host:a.git"));
        assert_eq!(remote.url(1), None);
        assert_eq!(remote.fetch_refspec(5), Some("+refs/tags/*:refs/tags/*"));
    }

    #[test]
    fn test_object_kind_names() {
        for kind in [ObjectKind::Commit, ObjectKind::Tree, ObjectKind::Blob, ObjectKind::Tag] {
            assert_eq!(ObjectKind::from_name(kind.as_str()), Some(kind));
            assert_eq!(ObjectKind::from_git2(kind.to_git2()), Some(kind));
        }
    }
}
