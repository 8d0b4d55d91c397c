//! Remote level.
//!
//! A remote yields one row per url position; when it has more fetch
//! refspecs than urls the extra rows carry a NULL url and the refspec at
//! that position, and refspec positions past the end reuse the last one.

use super::{passes, unbound, Binding, ChainableIter, RemotesIter, ReposIter, RowBuilder};
use crate::catalog::{remotes_schema, Row, Schema, Value};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{RemoteInfo, Repository};

/// Position over the remotes of one repository.
#[derive(Debug, Default)]
struct RemoteCursor {
    remotes: Vec<RemoteInfo>,
    idx: usize,
    pos: usize,
    current: Option<usize>,
}

impl RemoteCursor {
    fn load(&mut self, repo: &Repository) -> ExecuteResult<()> {
        self.remotes = repo.remotes()?;
        self.idx = 0;
        self.pos = 0;
        self.current = None;
        Ok(())
    }

    /// Move to the next (remote, position) pair.
    fn next(&mut self) -> Option<(&RemoteInfo, usize)> {
        while let Some(remote) = self.remotes.get(self.idx) {
            if self.pos < remote.row_count() {
                let pos = self.pos;
                self.pos += 1;
                self.current = Some(self.idx);
                return Some((&self.remotes[self.idx], pos));
            }
            self.idx += 1;
            self.pos = 0;
        }
        self.current = None;
        None
    }

    fn current(&self) -> Option<&RemoteInfo> {
        self.current.and_then(|i| self.remotes.get(i))
    }
}

/// Remotes of the bound repository.
#[derive(Debug, Default)]
pub struct AllRemotesIter {
    filter: Option<Expr>,
    bound: Option<Binding>,
    cursor: RemoteCursor,
    loaded: bool,
    row: Row,
}

impl AllRemotesIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// remote name and url position of the current row
    pub(crate) fn position(&self) -> Option<(usize, usize)> {
        self.cursor.current.map(|idx| (idx, self.cursor.pos.saturating_sub(1)))
    }
}

impl ChainableIter for AllRemotesIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            ..Default::default()
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        if !self.loaded {
            self.loaded = true;
            if let Err(e) = self.cursor.load(&bound.repo) {
                bound.skip(e, "remotes")?;
                return Ok(false);
            }
        }

        loop {
            bound.check()?;
            let Some((remote, pos)) = self.cursor.next() else {
                return Ok(false);
            };
            let schema_len = remotes_schema().len();
            let mut b = RowBuilder::with_capacity(schema_len);
            b.push_remote(bound.repo_id(), remote, pos);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        remotes_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.bound = None;
        Ok(())
    }
}

impl RemotesIter for AllRemotesIter {
    fn remote(&self) -> Option<&RemoteInfo> {
        self.cursor.current()
    }
}

/// Remotes of every repository yielded by the parent.
#[derive(Debug)]
pub struct RepoRemotesIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    cursor: Option<RemoteCursor>,
    row: Row,
}

impl<R: ReposIter> RepoRemotesIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            cursor: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<R: ReposIter> ChainableIter for RepoRemotesIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            cursor: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.cursor.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                let Some(repo) = self.parent.repository() else {
                    continue;
                };
                let mut cursor = RemoteCursor::default();
                if let Err(e) = cursor.load(repo) {
                    bound.skip(e, "remotes of repository")?;
                    continue;
                }
                self.cursor = Some(cursor);
            }

            let Some(cursor) = self.cursor.as_mut() else {
                continue;
            };
            let Some((remote, pos)) = cursor.next() else {
                self.cursor = None;
                continue;
            };

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + remotes_schema().len());
            b.extend_from(parent_row).push_remote(bound.repo_id(), remote, pos);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&remotes_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.cursor = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: ReposIter> RemotesIter for RepoRemotesIter<R> {
    fn remote(&self) -> Option<&RemoteInfo> {
        self.cursor.as_ref().and_then(RemoteCursor::current)
    }
}
