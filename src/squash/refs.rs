//! Reference level.
//!
//! Every reference cursor starts with a synthetic `HEAD` row pointing at
//! the commit HEAD resolves to, followed by the hash references of the
//! reference store. Symbolic references are skipped.

use super::{passes, unbound, Binding, ChainableIter, RefsIter, RemotesIter, ReposIter, RowBuilder};
use crate::catalog::{refs_schema, Row, Schema, Value};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{RefInfo, Reference, Repository, StorageResult};

pub(crate) const HEAD: &str = "HEAD";

/// HEAD (when it resolves) followed by every hash reference.
pub(crate) fn load_refs(repo: &Repository) -> StorageResult<Vec<RefInfo>> {
    let mut refs = Vec::new();
    match repo.head()? {
        Some(target) => refs.push(RefInfo {
            name: HEAD.to_string(),
            target,
        }),
        None => tracing::debug!(repo = repo.id(), "unable to get HEAD of repository"),
    }

    for reference in repo.references()? {
        match reference {
            Reference::Hash(info) if info.name != HEAD => refs.push(info),
            Reference::Hash(_) => {}
            Reference::Symbolic { name, target } => {
                tracing::debug!(repo = repo.id(), reference = %name, target = %target, "skipping symbolic reference");
            }
        }
    }
    Ok(refs)
}

#[derive(Debug, Default)]
struct RefCursor {
    refs: Vec<RefInfo>,
    pos: usize,
}

impl RefCursor {
    fn load(repo: &Repository, prefix: Option<&str>) -> StorageResult<Self> {
        let mut refs = load_refs(repo)?;
        if let Some(prefix) = prefix {
            refs.retain(|r| r.name.starts_with(prefix));
        }
        Ok(Self { refs, pos: 0 })
    }

    fn next(&mut self) -> Option<&RefInfo> {
        let r = self.refs.get(self.pos)?;
        self.pos += 1;
        Some(r)
    }

    fn current(&self) -> Option<&RefInfo> {
        self.pos.checked_sub(1).and_then(|i| self.refs.get(i))
    }
}

/// References of the bound repository.
#[derive(Debug, Default)]
pub struct AllRefsIter {
    filter: Option<Expr>,
    virtual_level: bool,
    bound: Option<Binding>,
    cursor: Option<RefCursor>,
    row: Row,
}

impl AllRefsIter {
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

impl ChainableIter for AllRefsIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            virtual_level: self.virtual_level,
            bound: Some(Binding::new(ctx, repo)),
            cursor: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        if self.cursor.is_none() {
            match RefCursor::load(&bound.repo, None) {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(e) => {
                    bound.skip(e, "references")?;
                    self.cursor = Some(RefCursor::default());
                }
            }
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };

        loop {
            bound.check()?;
            let Some(reference) = cursor.next() else {
                return Ok(false);
            };
            let mut b = RowBuilder::with_capacity(refs_schema().len());
            b.push_ref(bound.repo_id(), reference);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        if self.virtual_level {
            return &[];
        }
        &self.row
    }

    fn schema(&self) -> Schema {
        if self.virtual_level {
            return Schema::empty();
        }
        refs_schema()
    }

    fn filter_schema(&self) -> Schema {
        refs_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.cursor = None;
        self.bound = None;
        Ok(())
    }
}

impl RefsIter for AllRefsIter {
    fn reference(&self) -> Option<&RefInfo> {
        self.cursor.as_ref().and_then(RefCursor::current)
    }
}

/// Shared advance loop of the child reference levels: `load` produces the
/// refs for the parent's current item.
fn advance_child<P, F>(
    parent: &mut P,
    bound: &Binding,
    cursor: &mut Option<RefCursor>,
    filter: Option<&Expr>,
    row: &mut Row,
    load: F,
) -> ExecuteResult<bool>
where
    P: ChainableIter,
    F: Fn(&P) -> Option<StorageResult<RefCursor>>,
{
    loop {
        bound.check()?;

        if cursor.is_none() {
            if !parent.advance()? {
                return Ok(false);
            }
            match load(parent) {
                Some(Ok(loaded)) => *cursor = Some(loaded),
                Some(Err(e)) => {
                    bound.skip(e, "references")?;
                    continue;
                }
                None => continue,
            }
        }

        let Some(current) = cursor.as_mut() else {
            continue;
        };
        let Some(reference) = current.next() else {
            *cursor = None;
            continue;
        };

        let parent_row = parent.row();
        let mut b = RowBuilder::with_capacity(parent_row.len() + refs_schema().len());
        b.extend_from(parent_row).push_ref(bound.repo_id(), reference);
        let candidate = b.build();
        if passes(filter, &candidate)? {
            *row = candidate;
            return Ok(true);
        }
    }
}

/// References of every repository yielded by the parent.
#[derive(Debug)]
pub struct RepoRefsIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    cursor: Option<RefCursor>,
    row: Row,
}

impl<R: ReposIter> RepoRefsIter<R> {
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

impl<R: ReposIter> ChainableIter for RepoRefsIter<R> {
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
        advance_child(
            &mut self.parent,
            bound,
            &mut self.cursor,
            self.filter.as_ref(),
            &mut self.row,
            |p: &R| p.repository().map(|repo| RefCursor::load(repo, None)),
        )
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&refs_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.cursor = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: ReposIter> RefsIter for RepoRefsIter<R> {
    fn reference(&self) -> Option<&RefInfo> {
        self.cursor.as_ref().and_then(RefCursor::current)
    }
}

/// References under `refs/remotes/<remote>/` for every remote yielded by
/// the parent.
#[derive(Debug)]
pub struct RemoteRefsIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    cursor: Option<RefCursor>,
    row: Row,
}

impl<R: RemotesIter> RemoteRefsIter<R> {
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

impl<R: RemotesIter> ChainableIter for RemoteRefsIter<R> {
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
        let repo = bound.repo.clone();
        advance_child(
            &mut self.parent,
            bound,
            &mut self.cursor,
            self.filter.as_ref(),
            &mut self.row,
            |p: &R| {
                p.remote().map(|remote| {
                    let prefix = format!("refs/remotes/{}/", remote.name);
                    RefCursor::load(&repo, Some(&prefix))
                })
            },
        )
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&refs_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.cursor = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: RemotesIter> RefsIter for RemoteRefsIter<R> {
    fn reference(&self) -> Option<&RefInfo> {
        self.cursor.as_ref().and_then(RefCursor::current)
    }
}
