//! Repository level.

use super::{passes, unbound, Binding, ChainableIter, ReposIter, RowBuilder};
use crate::catalog::{repositories_schema, Row, Schema, Value};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::Repository;

/// Yields the bound repository as a single `[repository_id]` row.
#[derive(Debug, Default)]
pub struct AllReposIter {
    filter: Option<Expr>,
    bound: Option<Binding>,
    done: bool,
    row: Row,
}

impl AllReposIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl ChainableIter for AllReposIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            done: false,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        bound.check()?;
        if self.done {
            return Ok(false);
        }
        self.done = true;

        let mut b = RowBuilder::with_capacity(1);
        b.push(bound.repo_id());
        let row = b.build();
        if !passes(self.filter.as_ref(), &row)? {
            return Ok(false);
        }
        self.row = row;
        Ok(true)
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        repositories_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.bound = None;
        Ok(())
    }
}

impl ReposIter for AllReposIter {
    fn repository(&self) -> Option<&Repository> {
        match &self.bound {
            Some(b) if self.done => Some(&b.repo),
            _ => None,
        }
    }
}
