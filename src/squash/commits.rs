//! Commit levels.

use git2::Oid;

use super::{
    passes, unbound, Binding, ChainableIter, CommitsIter, HistoryWalker, ObjectCursor, RefsIter, ReposIter,
    RowBuilder,
};
use crate::catalog::{commits_schema, ref_commits_schema, Row, Schema, Value};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{CommitInfo, ObjectKind, RefInfo, Repository};

/// Commit a reference points at, peeling tags. Ok(None) means the
/// reference was skipped: it does not end at a commit, or it failed to
/// load and the session skips git errors.
fn ref_commit(bound: &Binding, reference: &RefInfo) -> ExecuteResult<Option<CommitInfo>> {
    match bound.repo.resolve_commit(reference.target) {
        Ok(Some(commit)) => Ok(Some(commit)),
        Ok(None) => {
            tracing::debug!(
                repo = bound.repo_id(),
                reference = %reference.name,
                hash = %reference.target,
                "reference does not point to a commit"
            );
            Ok(None)
        }
        Err(e) => {
            bound.skip(e, "commit of reference")?;
            Ok(None)
        }
    }
}

/// Next commit of an object enumeration, skipping the ones that fail to
/// load when the session allows it.
fn next_object_commit(bound: &Binding, ids: &mut ObjectCursor) -> ExecuteResult<Option<CommitInfo>> {
    loop {
        bound.check()?;
        let Some(oid) = ids.next() else {
            return Ok(None);
        };
        match bound.repo.find_commit(oid) {
            Ok(commit) => return Ok(Some(commit)),
            Err(e) => bound.skip(e, "commit")?,
        }
    }
}

fn load_commit_ids(bound: &Binding, repo: &Repository) -> ExecuteResult<Option<ObjectCursor>> {
    match ObjectCursor::load(repo, ObjectKind::Commit) {
        Ok(ids) => Ok(Some(ids)),
        Err(e) => {
            bound.skip(e, "commits of repository")?;
            Ok(None)
        }
    }
}

/// Every commit object of the bound repository.
#[derive(Debug, Default)]
pub struct AllCommitsIter {
    filter: Option<Expr>,
    bound: Option<Binding>,
    ids: Option<ObjectCursor>,
    commit: Option<CommitInfo>,
    row: Row,
}

impl AllCommitsIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl ChainableIter for AllCommitsIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            ..Default::default()
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        if self.ids.is_none() {
            self.ids = Some(load_commit_ids(bound, &bound.repo)?.unwrap_or_default());
        }
        let Some(ids) = self.ids.as_mut() else {
            return Ok(false);
        };

        while let Some(commit) = next_object_commit(bound, ids)? {
            let mut b = RowBuilder::with_capacity(commits_schema().len());
            b.push_commit(bound.repo_id(), &commit);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.commit = Some(commit);
                self.row = row;
                return Ok(true);
            }
        }
        self.commit = None;
        Ok(false)
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        commits_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.ids = None;
        self.bound = None;
        Ok(())
    }
}

impl CommitsIter for AllCommitsIter {
    fn commit(&self) -> Option<&CommitInfo> {
        self.commit.as_ref()
    }
}

/// Every commit object of each repository yielded by the parent.
#[derive(Debug)]
pub struct RepoCommitsIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    ids: Option<ObjectCursor>,
    commit: Option<CommitInfo>,
    row: Row,
}

impl<R: ReposIter> RepoCommitsIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            ids: None,
            commit: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<R: ReposIter> ChainableIter for RepoCommitsIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            ids: None,
            commit: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.ids.is_none() {
                if !self.parent.advance()? {
                    self.commit = None;
                    return Ok(false);
                }
                let Some(repo) = self.parent.repository() else {
                    continue;
                };
                self.ids = load_commit_ids(bound, repo)?;
                continue;
            }

            let Some(ids) = self.ids.as_mut() else {
                continue;
            };
            let Some(commit) = next_object_commit(bound, ids)? else {
                self.ids = None;
                continue;
            };

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + commits_schema().len());
            b.extend_from(parent_row).push_commit(bound.repo_id(), &commit);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.commit = Some(commit);
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&commits_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.ids = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: ReposIter> CommitsIter for RepoCommitsIter<R> {
    fn commit(&self) -> Option<&CommitInfo> {
        self.commit.as_ref()
    }
}

/// The commit each reference of the parent points at.
#[derive(Debug)]
pub struct RefHeadCommitsIter<R> {
    parent: R,
    filter: Option<Expr>,
    virtual_level: bool,
    bound: Option<Binding>,
    commit: Option<CommitInfo>,
    row: Row,
}

impl<R: RefsIter> RefHeadCommitsIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            virtual_level: false,
            bound: None,
            commit: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Contribute no columns to the row.
    pub fn as_virtual(mut self) -> Self {
        self.virtual_level = true;
        self
    }
}

impl<R: RefsIter> ChainableIter for RefHeadCommitsIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            virtual_level: self.virtual_level,
            bound: Some(Binding::new(ctx, repo)),
            commit: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;
            if !self.parent.advance()? {
                self.commit = None;
                return Ok(false);
            }
            let Some(reference) = self.parent.reference() else {
                continue;
            };
            let Some(commit) = ref_commit(bound, reference)? else {
                continue;
            };

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + commits_schema().len());
            b.extend_from(parent_row).push_commit(bound.repo_id(), &commit);
            let full = b.build();
            if !passes(self.filter.as_ref(), &full)? {
                continue;
            }

            self.row = if self.virtual_level {
                parent_row.to_vec()
            } else {
                full
            };
            self.commit = Some(commit);
            return Ok(true);
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        if self.virtual_level {
            return self.parent.schema();
        }
        self.filter_schema()
    }

    fn filter_schema(&self) -> Schema {
        self.parent.schema().join(&commits_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.commit = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: RefsIter> CommitsIter for RefHeadCommitsIter<R> {
    fn commit(&self) -> Option<&CommitInfo> {
        self.commit.as_ref()
    }
}

#[derive(Debug)]
struct RefHistory {
    ref_name: String,
    walker: HistoryWalker,
}

/// Every ancestor of the commit each parent reference points at, with its
/// distance from the reference. Rows carry the ref_commits columns
/// followed by the commits columns.
#[derive(Debug)]
pub struct RefCommitsIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    history: Option<RefHistory>,
    commit: Option<(CommitInfo, i64)>,
    row: Row,
}

impl<R: RefsIter> RefCommitsIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            history: None,
            commit: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// reference name, commit and history index of the current row
    pub(crate) fn position(&self) -> Option<(&str, Oid, i64)> {
        let history = self.history.as_ref()?;
        let (commit, index) = self.commit.as_ref()?;
        Some((history.ref_name.as_str(), commit.id.raw(), *index))
    }

    fn own_schema() -> Schema {
        ref_commits_schema().join(&commits_schema())
    }
}

impl<R: RefsIter> ChainableIter for RefCommitsIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            history: None,
            commit: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.history.is_none() {
                if !self.parent.advance()? {
                    self.commit = None;
                    return Ok(false);
                }
                let Some(reference) = self.parent.reference() else {
                    continue;
                };
                let Some(start) = ref_commit(bound, reference)? else {
                    continue;
                };
                self.history = Some(RefHistory {
                    ref_name: reference.name.clone(),
                    walker: HistoryWalker::new(start.id.raw()),
                });
            }

            let Some(history) = self.history.as_mut() else {
                continue;
            };
            let (commit, index) = match history.walker.next(&bound.repo) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.history = None;
                    continue;
                }
                Err(e) => {
                    bound.skip(e, "commit of history")?;
                    continue;
                }
            };

            let parent_row = self.parent.row();
            let width = parent_row.len() + Self::own_schema().len();
            let mut b = RowBuilder::with_capacity(width);
            b.extend_from(parent_row)
                .push_ref_commit(bound.repo_id(), commit.id.raw(), &history.ref_name, index)
                .push_commit(bound.repo_id(), &commit);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.commit = Some((commit, index));
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&Self::own_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.history = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: RefsIter> CommitsIter for RefCommitsIter<R> {
    fn commit(&self) -> Option<&CommitInfo> {
        self.commit.as_ref().map(|(commit, _)| commit)
    }
}
