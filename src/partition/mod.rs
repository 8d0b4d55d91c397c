//! Per-repository execution.
//!
//! Every repository of the pool is one partition. A partition runs one
//! squashed cursor (or one index-driven cursor) on the calling thread;
//! parallelism across repositories is the job of [`RowRepoIter`].

mod fanout;

pub use fanout::{RowIterFactory, RowRepoIter, WorkerGroup};

use std::collections::VecDeque;

use crate::catalog::{Row, Schema};
use crate::executor::{ExecuteResult, FilterIter, ProjectIter, RowIter};
use crate::index::{IndexRowIter, IndexValueIter, Indexable, KeyRowMapper, KeyValueIter};
use crate::session::Context;
use crate::sql::Expr;
use crate::squash::ChainableIter;
use crate::storage::{Repository, RepositoryPool};

/// One repository of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryPartition(String);

impl RepositoryPartition {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// One partition per repository, in pool order.
pub fn partitions(pool: &RepositoryPool) -> Vec<RepositoryPartition> {
    pool.ids().into_iter().map(RepositoryPartition).collect()
}

/// Adapts a bound [`ChainableIter`] to [`RowIter`].
pub struct ChainRowIter<I> {
    cursor: Option<I>,
}

impl<I: ChainableIter> ChainRowIter<I> {
    pub fn new(cursor: I) -> Self {
        Self { cursor: Some(cursor) }
    }

    pub fn empty() -> Self {
        Self { cursor: None }
    }
}

impl<I: ChainableIter> RowIter for ChainRowIter<I> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.advance() {
            Ok(true) => Ok(Some(cursor.row().to_vec())),
            Ok(false) => Ok(None),
            Err(e) => {
                if let Err(close_err) = self.close() {
                    tracing::debug!(error = %close_err, "closing cursor after error");
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) -> ExecuteResult<()> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}

/// Partitions read one after the other.
pub struct PartitionRows<I> {
    pending: VecDeque<ChainRowIter<I>>,
}

impl<I: ChainableIter> RowIter for PartitionRows<I> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        loop {
            let Some(current) = self.pending.front_mut() else {
                return Ok(None);
            };
            if let Some(row) = current.next_row()? {
                return Ok(Some(row));
            }
            if let Some(mut done) = self.pending.pop_front() {
                done.close()?;
            }
        }
    }

    fn close(&mut self) -> ExecuteResult<()> {
        let mut first = Ok(());
        for mut iter in self.pending.drain(..) {
            let res = iter.close();
            if first.is_ok() {
                first = res;
            }
        }
        first
    }
}

/// Keys of an index lookup plus the mapper that turns them into rows.
pub struct IndexLookup<M> {
    values: Box<dyn IndexValueIter>,
    mapper: M,
}

impl<M: KeyRowMapper> IndexLookup<M> {
    pub fn new(values: impl IndexValueIter + 'static, mapper: M) -> Self {
        Self {
            values: Box::new(values),
            mapper,
        }
    }
}

/// A table served by a squashed cursor template.
#[derive(Debug, Clone)]
pub struct SquashedTable<I> {
    template: I,
}

impl<I: ChainableIter> SquashedTable<I> {
    pub fn new(template: I) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &I {
        &self.template
    }

    pub fn schema(&self) -> Schema {
        self.template.schema()
    }

    fn repository(&self, ctx: &Context, partition: &RepositoryPartition) -> ExecuteResult<Option<Repository>> {
        match ctx.session().pool().get(partition.id()) {
            Ok(repo) => Ok(Some(repo)),
            Err(e) if ctx.session().skip_git_errors() => {
                tracing::warn!(repo = partition.id(), error = %e, "skipped partition");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cursor over one partition. An unknown repository yields no rows
    /// when the session skips git errors.
    pub fn partition_rows(&self, ctx: &Context, partition: &RepositoryPartition) -> ExecuteResult<ChainRowIter<I>> {
        ctx.check()?;
        match self.repository(ctx, partition)? {
            Some(repo) => Ok(ChainRowIter::new(self.template.new(ctx, &repo)?)),
            None => Ok(ChainRowIter::empty()),
        }
    }

    /// Every partition, sequentially, in pool order.
    pub fn rows(&self, ctx: &Context) -> ExecuteResult<PartitionRows<I>> {
        let mut pending = VecDeque::new();
        for partition in partitions(ctx.session().pool()) {
            pending.push_back(self.partition_rows(ctx, &partition)?);
        }
        Ok(PartitionRows { pending })
    }
}

impl<I: ChainableIter + 'static> SquashedTable<I> {
    /// Rows of one partition, read through `lookup` when one is given and
    /// through the squashed cursor otherwise. `filter` is what is left to
    /// check on the rows, `projection` the columns to keep.
    pub fn rows_for_partition<M: KeyRowMapper + 'static>(
        &self,
        ctx: &Context,
        partition: &RepositoryPartition,
        filter: Option<Expr>,
        projection: Option<Vec<usize>>,
        lookup: Option<IndexLookup<M>>,
    ) -> ExecuteResult<Box<dyn RowIter>> {
        let rows: Box<dyn RowIter> = match lookup {
            Some(lookup) => {
                let mut iter = IndexRowIter::new(ctx, lookup.values, lookup.mapper).with_partition(partition.id());
                if let Some(filter) = filter {
                    iter = iter.with_filter(filter);
                }
                Box::new(iter)
            }
            None => {
                let iter = self.partition_rows(ctx, partition)?;
                match filter {
                    Some(filter) => Box::new(FilterIter::new(iter, filter)),
                    None => Box::new(iter),
                }
            }
        };
        Ok(match projection {
            Some(indices) => Box::new(ProjectIter::new(rows, indices)),
            None => rows,
        })
    }
}

impl<I: Indexable> SquashedTable<I> {
    /// `(values, key)` stream of one partition for building an index on
    /// `columns`.
    pub fn build_index(
        &self,
        ctx: &Context,
        partition: &RepositoryPartition,
        columns: &[&str],
    ) -> ExecuteResult<KeyValueIter<I>> {
        let repo = ctx.session().pool().get(partition.id())?;
        KeyValueIter::new(&self.template, ctx, &repo, columns)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{commits_schema, Value};
    use crate::executor::{collect_rows, ExecuteError};
    use crate::index::{CommitsKeyMapper, MemoryIndex};
    use crate::session::Session;
    use crate::sql::Parser;
    use crate::squash::{AllCommitsIter, AllReposIter, RepoRefsIter};
    use crate::test_support::{pack_repository, scenario};

    fn two_repos() -> (Vec<crate::test_support::Scenario>, Arc<RepositoryPool>) {
        let a = scenario();
        let b = scenario();
        let mut pool = RepositoryPool::new();
        pool.add_git("a", a.path()).unwrap();
        pool.add_git("b", b.path()).unwrap();
        (vec![a, b], Arc::new(pool))
    }

    #[test]
    fn test_partitions_in_pool_order() {
        let (_repos, pool) = two_repos();
        let parts = partitions(&pool);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id(), "a");
        assert_eq!(parts[1].key(), b"b");
    }

    #[test]
    fn test_rows_covers_every_partition() {
        let (_repos, pool) = two_repos();
        let ctx = Context::new(Arc::new(Session::new(pool)));
        let table = SquashedTable::new(AllCommitsIter::default());

        let rows = collect_rows(table.rows(&ctx).unwrap()).unwrap();
        assert_eq!(rows.len(), 18);
        assert_eq!(rows[0][0], Value::from("a"));
        assert_eq!(rows[17][0], Value::from("b"));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let (_repos, pool) = two_repos();
        let ctx = Context::new(Arc::new(Session::new(pool)));
        let table = SquashedTable::new(RepoRefsIter::from_parent(AllReposIter::default()));
        let part = RepositoryPartition::new("b");

        let first = collect_rows(table.partition_rows(&ctx, &part).unwrap()).unwrap();
        let second = collect_rows(table.partition_rows(&ctx, &part).unwrap()).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_partition() {
        let (_repos, pool) = two_repos();
        let table = SquashedTable::new(AllCommitsIter::default());
        let missing = RepositoryPartition::new("missing");

        let strict = Context::new(Arc::new(Session::new(pool.clone())));
        assert!(matches!(
            table.partition_rows(&strict, &missing),
            Err(ExecuteError::Storage(_))
        ));

        let lenient = Context::new(Arc::new(Session::new(pool).with_skip_git_errors(true)));
        let rows = collect_rows(table.partition_rows(&lenient, &missing).unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_rows_for_partition_filter_and_projection() {
        let (_repos, pool) = two_repos();
        let ctx = Context::new(Arc::new(Session::new(pool)));
        let table = SquashedTable::new(AllCommitsIter::default());
        let filter = Parser::parse_filter("commit_message = 'commit 2'", &commits_schema()).unwrap();

        let rows = collect_rows(
            table
                .rows_for_partition::<CommitsKeyMapper>(
                    &ctx,
                    &RepositoryPartition::new("a"),
                    Some(filter),
                    Some(vec![8, 0]),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rows, vec![vec![Value::from("commit 2"), Value::from("a")]]);
    }

    #[test]
    fn test_rows_for_partition_through_index() {
        let (repos, _) = two_repos();
        for s in &repos {
            pack_repository(&s.repo);
        }
        let mut pool = RepositoryPool::new();
        pool.add_git("a", repos[0].path()).unwrap();
        pool.add_git("b", repos[1].path()).unwrap();
        let ctx = Context::new(Arc::new(Session::new(Arc::new(pool))));
        let table = SquashedTable::new(AllCommitsIter::default());

        let mut index = MemoryIndex::new(&["commit_message"]);
        for part in partitions(ctx.session().pool()) {
            let mut kv = table.build_index(&ctx, &part, &["commit_message"]).unwrap();
            index.build(&mut kv).unwrap();
        }

        let lookup = IndexLookup::new(index.lookup(&[Value::from("commit 4")]), CommitsKeyMapper);
        let rows = collect_rows(
            table
                .rows_for_partition(&ctx, &RepositoryPartition::new("b"), None, Some(vec![0, 8]), Some(lookup))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rows, vec![vec![Value::from("b"), Value::from("commit 4")]]);
    }

    #[test]
    fn test_chain_closed_on_error() {
        let (_repos, pool) = two_repos();
        let ctx = Context::new(Arc::new(Session::new(pool)));
        let table = SquashedTable::new(AllCommitsIter::default());
        let mut iter = table.partition_rows(&ctx, &RepositoryPartition::new("a")).unwrap();

        assert!(iter.next_row().unwrap().is_some());
        ctx.cancel();
        assert!(matches!(iter.next_row(), Err(ExecuteError::Canceled)));
        // the chain is gone after the error
        assert!(iter.next_row().unwrap().is_none());
    }
}
