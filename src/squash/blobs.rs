//! Blob levels.
//!
//! Blob content is only read when the level was built `with_content(true)`
//! and the blob is within the session's size limit; see
//! [`blob::row_content`] for the binary rule.

use std::collections::HashSet;

use git2::Oid;

use super::{
    passes, unbound, Binding, ChainableIter, CommitsIter, ObjectCursor, ReposIter, RowBuilder, TreeEntriesIter,
    TreeWalker,
};
use crate::catalog::{blobs_schema, commit_blobs_schema, Row, Schema, Value};
use crate::config::BlobsConfig;
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{blob, ObjectKind, Repository, StorageResult};

/// Size of a blob and, when wanted, its content.
pub(crate) fn load_blob(
    repo: &Repository,
    oid: Oid,
    read_content: bool,
    cfg: &BlobsConfig,
) -> StorageResult<(usize, Vec<u8>)> {
    let size = repo.blob_size(oid)?;
    if !blob::wants_content(size, read_content, cfg) {
        return Ok((size, Vec::new()));
    }
    Ok((size, repo.blob_content(oid)?))
}

/// Blob row for `oid` appended to `parent`. Ok(None) when the blob failed
/// to load and the session skips git errors.
fn blob_row(bound: &Binding, parent: &[Value], oid: Oid, read_content: bool) -> ExecuteResult<Option<Row>> {
    let cfg = bound.ctx.session().blobs();
    let (size, content) = match load_blob(&bound.repo, oid, read_content, cfg) {
        Ok(blob) => blob,
        Err(e) => {
            bound.skip(e, "blob")?;
            return Ok(None);
        }
    };
    let mut b = RowBuilder::with_capacity(parent.len() + blobs_schema().len());
    b.extend_from(parent)
        .push_blob(bound.repo_id(), oid, size, content, read_content, cfg);
    Ok(Some(b.build()))
}

fn load_blob_ids(bound: &Binding, repo: &Repository) -> ExecuteResult<Option<ObjectCursor>> {
    match ObjectCursor::load(repo, ObjectKind::Blob) {
        Ok(ids) => Ok(Some(ids)),
        Err(e) => {
            bound.skip(e, "blobs of repository")?;
            Ok(None)
        }
    }
}

/// Every blob object of the bound repository.
#[derive(Debug, Default)]
pub struct AllBlobsIter {
    filter: Option<Expr>,
    read_content: bool,
    bound: Option<Binding>,
    ids: Option<ObjectCursor>,
    current: Option<Oid>,
    row: Row,
}

impl AllBlobsIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Load blob content into `blob_content`.
    pub fn with_content(mut self, read_content: bool) -> Self {
        self.read_content = read_content;
        self
    }

    pub(crate) fn current_blob(&self) -> Option<Oid> {
        self.current
    }
}

impl ChainableIter for AllBlobsIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            read_content: self.read_content,
            bound: Some(Binding::new(ctx, repo)),
            ..Default::default()
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        if self.ids.is_none() {
            self.ids = Some(load_blob_ids(bound, &bound.repo)?.unwrap_or_default());
        }
        let Some(ids) = self.ids.as_mut() else {
            return Ok(false);
        };

        loop {
            bound.check()?;
            let Some(oid) = ids.next() else {
                self.current = None;
                return Ok(false);
            };
            let Some(row) = blob_row(bound, &[], oid, self.read_content)? else {
                continue;
            };
            if passes(self.filter.as_ref(), &row)? {
                self.current = Some(oid);
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        blobs_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.ids = None;
        self.bound = None;
        Ok(())
    }
}

/// Every blob object of each repository yielded by the parent.
#[derive(Debug)]
pub struct RepoBlobsIter<R> {
    parent: R,
    filter: Option<Expr>,
    read_content: bool,
    bound: Option<Binding>,
    ids: Option<ObjectCursor>,
    current: Option<Oid>,
    row: Row,
}

impl<R: ReposIter> RepoBlobsIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            read_content: false,
            bound: None,
            ids: None,
            current: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_content(mut self, read_content: bool) -> Self {
        self.read_content = read_content;
        self
    }

    pub(crate) fn current_blob(&self) -> Option<Oid> {
        self.current
    }
}

impl<R: ReposIter> ChainableIter for RepoBlobsIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            read_content: self.read_content,
            bound: Some(Binding::new(ctx, repo)),
            ids: None,
            current: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.ids.is_none() {
                if !self.parent.advance()? {
                    self.current = None;
                    return Ok(false);
                }
                let Some(repo) = self.parent.repository() else {
                    continue;
                };
                self.ids = load_blob_ids(bound, repo)?;
                continue;
            }

            let Some(ids) = self.ids.as_mut() else {
                continue;
            };
            let Some(oid) = ids.next() else {
                self.ids = None;
                continue;
            };
            let Some(row) = blob_row(bound, self.parent.row(), oid, self.read_content)? else {
                continue;
            };
            if passes(self.filter.as_ref(), &row)? {
                self.current = Some(oid);
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&blobs_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.ids = None;
        self.bound = None;
        self.parent.close()
    }
}

/// The blob of each file entry yielded by the parent. Subtree and
/// submodule entries have no blob and are passed over.
#[derive(Debug)]
pub struct TreeEntryBlobsIter<T> {
    parent: T,
    filter: Option<Expr>,
    read_content: bool,
    bound: Option<Binding>,
    current: Option<Oid>,
    row: Row,
}

impl<T: TreeEntriesIter> TreeEntryBlobsIter<T> {
    pub fn from_parent(parent: T) -> Self {
        Self {
            parent,
            filter: None,
            read_content: false,
            bound: None,
            current: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_content(mut self, read_content: bool) -> Self {
        self.read_content = read_content;
        self
    }

    pub(crate) fn current_blob(&self) -> Option<Oid> {
        self.current
    }
}

impl<T: TreeEntriesIter> ChainableIter for TreeEntryBlobsIter<T> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            read_content: self.read_content,
            bound: Some(Binding::new(ctx, repo)),
            current: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;
            if !self.parent.advance()? {
                self.current = None;
                return Ok(false);
            }
            let oid = match self.parent.tree_entry() {
                Some(entry) if !entry.is_tree() && !entry.is_submodule() => entry.id,
                _ => continue,
            };
            let Some(row) = blob_row(bound, self.parent.row(), oid, self.read_content)? else {
                continue;
            };
            if passes(self.filter.as_ref(), &row)? {
                self.current = Some(oid);
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&blobs_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.bound = None;
        self.parent.close()
    }
}

#[derive(Debug)]
struct CommitBlobWalk {
    commit: Oid,
    walker: TreeWalker,
    seen: HashSet<Oid>,
}

/// Distinct blobs reachable from each commit yielded by the parent.
#[derive(Debug)]
pub struct CommitBlobsIter<C> {
    parent: C,
    filter: Option<Expr>,
    bound: Option<Binding>,
    walk: Option<CommitBlobWalk>,
    current: Option<Oid>,
    row: Row,
}

impl<C: CommitsIter> CommitBlobsIter<C> {
    pub fn from_parent(parent: C) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            walk: None,
            current: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub(crate) fn current_blob(&self) -> Option<Oid> {
        self.current
    }
}

impl<C: CommitsIter> ChainableIter for CommitBlobsIter<C> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            walk: None,
            current: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.walk.is_none() {
                if !self.parent.advance()? {
                    self.current = None;
                    return Ok(false);
                }
                let Some(commit) = self.parent.commit() else {
                    continue;
                };
                let mut walker = TreeWalker::new(true);
                walker.reset(commit.tree_id.raw());
                self.walk = Some(CommitBlobWalk {
                    commit: commit.id.raw(),
                    walker,
                    seen: HashSet::new(),
                });
            }

            let Some(walk) = self.walk.as_mut() else {
                continue;
            };
            let item = match walk.walker.next(&bound.repo) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    self.walk = None;
                    continue;
                }
                Err(e) => {
                    bound.skip(e, "tree of commit")?;
                    continue;
                }
            };
            if item.entry.is_tree() || item.entry.is_submodule() || !walk.seen.insert(item.entry.id) {
                continue;
            }

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + commit_blobs_schema().len());
            b.extend_from(parent_row)
                .push_commit_blob(bound.repo_id(), walk.commit, item.entry.id);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.current = Some(item.entry.id);
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&commit_blobs_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.walk = None;
        self.bound = None;
        self.parent.close()
    }
}
