//! Core Git repository wrapper.
//!
//! This wraps `git2::Repository` with thread-safe access and an identifier
//! chosen by the caller. Every read the cursors need from libgit2 goes
//! through here and comes back as owned data, so no borrowed git2 object
//! outlives the lock.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Oid;
use parking_lot::Mutex;

use crate::storage::commit::CommitInfo;
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::refs::{self, Reference};
use crate::storage::tree::{self, TreeEntryInfo};
use crate::storage::types::{ObjectKind, RemoteInfo};

/// A repository registered under a stable id.
///
/// Clone this to share across threads - it uses Arc internally. The
/// underlying handle is released when the last clone is dropped.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    id: String,
    path: PathBuf,
    repo: Mutex<git2::Repository>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .finish()
    }
}

impl Repository {
    /// Open an existing repository at `path` and register it as `id`.
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = git2::Repository::open(path)?;
        Ok(Self::from_git2(id, path, repo))
    }

    /// Wrap an already opened libgit2 handle.
    pub fn from_git2(id: impl Into<String>, path: impl AsRef<Path>, repo: git2::Repository) -> Self {
        Self {
            inner: Arc::new(RepositoryInner {
                id: id.into(),
                path: path.as_ref().to_path_buf(),
                repo: Mutex::new(repo),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get the repository path as given when opening.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with exclusive access to the libgit2 handle.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&git2::Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// All references, in the order the reference store lists them.
    pub fn references(&self) -> StorageResult<Vec<Reference>> {
        self.with_repo(refs::list_references)
    }

    /// The commit HEAD resolves to, if the repository has one.
    pub fn head(&self) -> StorageResult<Option<Oid>> {
        self.with_repo(refs::head_target)
    }

    /// Peel `oid` through tags down to a commit. Returns None when the
    /// chain ends at something that is not a commit.
    pub fn resolve_commit(&self, oid: Oid) -> StorageResult<Option<CommitInfo>> {
        self.with_repo(|repo| refs::resolve_commit(repo, oid))
    }

    pub fn find_commit(&self, oid: Oid) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| Ok(CommitInfo::from_git2(&repo.find_commit(oid)?)))
    }

    pub fn tree_entries(&self, oid: Oid) -> StorageResult<Vec<TreeEntryInfo>> {
        self.with_repo(|repo| tree::tree_entries(repo, oid))
    }

    /// Size of a blob without reading its content.
    pub fn blob_size(&self, oid: Oid) -> StorageResult<usize> {
        self.with_repo(|repo| {
            let (size, kind) = repo.odb()?.read_header(oid)?;
            if kind != git2::ObjectType::Blob {
                return Err(StorageError::UnexpectedObjectType {
                    oid,
                    expected: "blob",
                    found: ObjectKind::from_git2(kind).map(|k| k.as_str()).unwrap_or("unknown"),
                });
            }
            Ok(size)
        })
    }

    pub fn blob_content(&self, oid: Oid) -> StorageResult<Vec<u8>> {
        self.with_repo(|repo| Ok(repo.find_blob(oid)?.content().to_vec()))
    }

    /// Ids of every object of `kind` in the object database.
    ///
    /// Objects present both loose and packed are reported once.
    pub fn object_ids(&self, kind: ObjectKind) -> StorageResult<Vec<Oid>> {
        self.with_repo(|repo| {
            let odb = repo.odb()?;
            let mut all = Vec::new();
            odb.foreach(|oid| {
                all.push(*oid);
                true
            })?;

            let mut seen = HashSet::with_capacity(all.len());
            let mut ids = Vec::new();
            for oid in all {
                if !seen.insert(oid) {
                    continue;
                }
                let (_, found) = odb.read_header(oid)?;
                if found == kind.to_git2() {
                    ids.push(oid);
                }
            }
            Ok(ids)
        })
    }

    /// Configured remotes, in configuration order.
    pub fn remotes(&self) -> StorageResult<Vec<RemoteInfo>> {
        self.with_repo(|repo| {
            let names = repo.remotes()?;
            let mut remotes = Vec::with_capacity(names.len());
            for name in names.iter().flatten() {
                let remote = repo.find_remote(name)?;
                let urls = remote.url().map(|u| vec![u.to_string()]).unwrap_or_default();
                let fetch = remote
                    .fetch_refspecs()?
                    .iter()
                    .flatten()
                    .map(str::to_string)
                    .collect();
                remotes.push(RemoteInfo {
                    name: name.to_string(),
                    urls,
                    fetch,
                });
            }
            Ok(remotes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, init_repo};

    #[test]
    fn test_object_ids_by_kind() {
        let (dir, git) = init_repo();
        let c1 = commit_files(&git, &[("a", b"1"), ("d/b", b"2")], "one", &[]);
        commit_files(&git, &[("a", b"1"), ("d/b", b"3")], "two", &[c1]);

        let repo = Repository::from_git2("r", dir.path(), git);
        assert_eq!(repo.object_ids(ObjectKind::Commit).unwrap().len(), 2);
        // "1", "2", "3"
        assert_eq!(repo.object_ids(ObjectKind::Blob).unwrap().len(), 3);
        // two root trees, two "d" trees
        assert_eq!(repo.object_ids(ObjectKind::Tree).unwrap().len(), 4);
    }

    #[test]
    fn test_remotes() {
        let (dir, git) = init_repo();
        git.remote("origin", "https://example.com/a.git").unwrap();
        let repo = Repository::from_git2("r", dir.path(), git);

        let remotes = repo.remotes().unwrap();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "origin");
        assert_eq!(remotes[0].url(0), Some("https://example.com/a.git"));
        assert_eq!(
            remotes[0].fetch_refspec(0),
            Some("+refs/heads/*:refs/remotes/origin/*")
        );
    }

    #[test]
    fn test_blob_size_and_content() {
        let (dir, git) = init_repo();
        let blob = git.blob(b"hello world").unwrap();
        let repo = Repository::from_git2("r", dir.path(), git);
        assert_eq!(repo.blob_size(blob).unwrap(), 11);
        assert_eq!(repo.blob_content(blob).unwrap(), b"hello world");
    }
}
