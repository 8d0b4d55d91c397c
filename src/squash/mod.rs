//! Squashed cursors.
//!
//! A logical join over the git tables (repositories ⋈ refs ⋈ commits ⋈
//! tree entries ⋈ blobs, ...) is executed as a single streaming traversal:
//! every level is a [`ChainableIter`] that wraps its parent level and, for
//! each parent item, produces the matching child items.
//!
//! ```text
//!   AllReposIter ─▶ RepoRefsIter ─▶ RefCommitsIter ─▶ CommitTreeEntriesIter ─▶ TreeEntryBlobsIter
//!   [repo]          [repo|ref]      [repo|ref|rc|c]   [... |tree entry]         [... |blob]
//! ```
//!
//! A level's row is its parent's row followed by its own columns. A
//! *virtual* level contributes no columns: its row and schema are its
//! parent's, although its filter still sees its own columns.
//!
//! Templates are built unbound (`Default` for root levels, `from_parent`
//! for child levels) and turned into cursors with [`ChainableIter::new`],
//! which binds the whole chain to one repository.

mod blobs;
mod commits;
mod refs;
mod remotes;
mod repos;
mod row;
mod tree_entries;
mod walk;

pub use blobs::{AllBlobsIter, CommitBlobsIter, RepoBlobsIter, TreeEntryBlobsIter};
pub use commits::{AllCommitsIter, RefCommitsIter, RefHeadCommitsIter, RepoCommitsIter};
pub use refs::{AllRefsIter, RemoteRefsIter, RepoRefsIter};
pub use remotes::{AllRemotesIter, RepoRemotesIter};
pub use repos::AllReposIter;
pub use row::RowBuilder;
pub use tree_entries::{
    AllFilesIter, AllTreeEntriesIter, CommitFilesIter, CommitMainTreeEntriesIter, CommitTreeEntriesIter,
    CommitTreesIter, RepoTreeEntriesIter,
};
pub use walk::{HistoryWalker, TreeWalker, WalkItem};

use git2::Oid;

use crate::catalog::{Schema, Value};
use crate::executor::{matches_where, ExecuteError, ExecuteResult};
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{CommitInfo, ObjectKind, RefInfo, RemoteInfo, Repository, StorageResult, TreeEntryInfo};

/// One level of a squashed traversal.
pub trait ChainableIter: Send {
    /// Bind a fresh cursor (and its parents) to `repo`.
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self>
    where
        Self: Sized;

    /// Move to the next row. Returns false at the end of the stream.
    fn advance(&mut self) -> ExecuteResult<bool>;

    /// Current row. Only meaningful after `advance` returned true.
    fn row(&self) -> &[Value];

    /// Layout of `row`.
    fn schema(&self) -> Schema;

    /// Layout the level's filter is resolved against: the parent's row
    /// followed by this level's columns, even for virtual levels.
    fn filter_schema(&self) -> Schema {
        self.schema()
    }

    /// Release the cursor and its parents.
    fn close(&mut self) -> ExecuteResult<()>;
}

/// A level positioned on a repository.
pub trait ReposIter: ChainableIter {
    fn repository(&self) -> Option<&Repository>;
}

/// A level positioned on a remote (and one of its url positions).
pub trait RemotesIter: ChainableIter {
    fn remote(&self) -> Option<&RemoteInfo>;
}

/// A level positioned on a hash reference.
pub trait RefsIter: ChainableIter {
    fn reference(&self) -> Option<&RefInfo>;
}

/// A level positioned on a commit.
pub trait CommitsIter: ChainableIter {
    fn commit(&self) -> Option<&CommitInfo>;
}

/// A level positioned on a tree entry.
pub trait TreeEntriesIter: ChainableIter {
    fn tree_entry(&self) -> Option<&TreeEntryInfo>;

    /// tree that holds the current entry
    fn tree_id(&self) -> Option<Oid>;
}

/// What a bound cursor knows about its query.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub ctx: Context,
    pub repo: Repository,
}

impl Binding {
    pub fn new(ctx: &Context, repo: &Repository) -> Self {
        Self {
            ctx: ctx.clone(),
            repo: repo.clone(),
        }
    }

    pub fn repo_id(&self) -> &str {
        self.repo.id()
    }

    pub fn check(&self) -> ExecuteResult<()> {
        self.ctx.check()
    }

    /// Decide on a failed candidate: `Ok(())` means it was logged and the
    /// caller moves on, otherwise the error is handed back.
    pub fn skip(&self, err: impl Into<ExecuteError>, what: &str) -> ExecuteResult<()> {
        let err = err.into();
        if self.ctx.session().skip_git_errors() && err.is_skippable() {
            tracing::warn!(repo = self.repo.id(), error = %err, "skipped {}", what);
            return Ok(());
        }
        Err(err)
    }
}

pub(crate) fn unbound() -> ExecuteError {
    ExecuteError::InvalidContext("cursor is not bound to a repository".into())
}

/// Position over the ids of every object of one kind in a repository.
#[derive(Debug, Default)]
pub(crate) struct ObjectCursor {
    ids: Vec<Oid>,
    pos: usize,
}

impl ObjectCursor {
    pub fn load(repo: &Repository, kind: ObjectKind) -> StorageResult<Self> {
        Ok(Self {
            ids: repo.object_ids(kind)?,
            pos: 0,
        })
    }

    pub fn next(&mut self) -> Option<Oid> {
        let id = self.ids.get(self.pos).copied()?;
        self.pos += 1;
        Some(id)
    }
}

/// Run a level's filter on its full row.
pub(crate) fn passes(filter: Option<&Expr>, row: &[Value]) -> ExecuteResult<bool> {
    match filter {
        Some(expr) => matches_where(expr, row),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests;
