//! Named tables: each one is a squashed cursor template narrowed to the
//! table's own columns.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::catalog::{self, Row, Schema};
use crate::executor::{ExecuteError, ExecuteResult, FilterIter, ProjectIter, RowIter};
use crate::partition::{ChainRowIter, RowIterFactory, RowRepoIter};
use crate::session::Context;
use crate::sql::{Expr, Parser};
use crate::squash::{
    AllBlobsIter, AllCommitsIter, AllFilesIter, AllRefsIter, AllRemotesIter, AllReposIter, AllTreeEntriesIter,
    ChainableIter, CommitBlobsIter, CommitFilesIter, CommitTreesIter, RefCommitsIter,
};
use crate::storage::Repository;

/// A table ready to be scanned.
pub struct Table {
    name: String,
    schema: Schema,
    factory: RowIterFactory,
}

/// Trailing `width` columns of a `total` wide row.
fn tail(total: usize, width: usize) -> Vec<usize> {
    (total - width..total).collect()
}

/// Rows of `template`, optionally projected, then filtered.
fn factory<I>(template: I, projection: Option<Vec<usize>>, filter: Option<Expr>) -> RowIterFactory
where
    I: ChainableIter + Sync + 'static,
{
    Arc::new(move |ctx: &Context, repo: &Repository| -> ExecuteResult<Box<dyn RowIter>> {
        let mut rows: Box<dyn RowIter> = Box::new(ChainRowIter::new(template.new(ctx, repo)?));
        if let Some(indices) = &projection {
            rows = Box::new(ProjectIter::new(rows, indices.clone()));
        }
        if let Some(filter) = &filter {
            rows = Box::new(FilterIter::new(rows, filter.clone()));
        }
        Ok(rows)
    })
}

/// Single level tables take the filter into the cursor itself.
fn root<I>(template: I, filter: Option<Expr>, with_filter: fn(I, Expr) -> I) -> RowIterFactory
where
    I: ChainableIter + Sync + 'static,
{
    let template = match filter {
        Some(filter) => with_filter(template, filter),
        None => template,
    };
    factory(template, None, None)
}

/// Child level tables are projected out of a chain and filtered after.
fn chained<I>(template: I, width: usize, filter: Option<Expr>) -> RowIterFactory
where
    I: ChainableIter + Sync + 'static,
{
    let total = template.schema().len();
    factory(template, Some(tail(total, width)), filter)
}

impl Table {
    /// Look up `name` and prepare its scan, keeping only rows matching the
    /// SQL expression `filter` when one is given.
    pub fn open(name: &str, filter: Option<&str>) -> ExecuteResult<Self> {
        let schema = catalog::table_schema(name).ok_or_else(|| ExecuteError::TableNotFound(name.to_string()))?;
        let filter = filter.map(|sql| Parser::parse_filter(sql, &schema)).transpose()?;
        let width = schema.len();

        let factory = match name {
            catalog::REPOSITORIES_TABLE => root(AllReposIter::default(), filter, AllReposIter::with_filter),
            catalog::REMOTES_TABLE => root(AllRemotesIter::default(), filter, AllRemotesIter::with_filter),
            catalog::REFS_TABLE => root(AllRefsIter::default(), filter, AllRefsIter::with_filter),
            catalog::COMMITS_TABLE => root(AllCommitsIter::default(), filter, AllCommitsIter::with_filter),
            catalog::TREE_ENTRIES_TABLE => {
                root(AllTreeEntriesIter::default(), filter, AllTreeEntriesIter::with_filter)
            }
            catalog::BLOBS_TABLE => root(
                AllBlobsIter::default().with_content(true),
                filter,
                AllBlobsIter::with_filter,
            ),
            catalog::FILES_TABLE => root(
                AllFilesIter::default().with_content(true),
                filter,
                AllFilesIter::with_filter,
            ),
            catalog::REF_COMMITS_TABLE => {
                // drop the commit columns that follow ref_commits
                let chain = RefCommitsIter::from_parent(AllRefsIter::default().as_virtual());
                let commits = catalog::commits_schema().len();
                let total = chain.schema().len();
                let projection = (total - commits - width..total - commits).collect();
                factory(chain, Some(projection), filter)
            }
            catalog::COMMIT_TREES_TABLE => {
                chained(CommitTreesIter::from_parent(AllCommitsIter::default()), width, filter)
            }
            catalog::COMMIT_BLOBS_TABLE => {
                chained(CommitBlobsIter::from_parent(AllCommitsIter::default()), width, filter)
            }
            catalog::COMMIT_FILES_TABLE => {
                chained(CommitFilesIter::from_parent(AllCommitsIter::default()), width, filter)
            }
            _ => return Err(ExecuteError::TableNotFound(name.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            schema,
            factory,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn factory(&self) -> RowIterFactory {
        self.factory.clone()
    }

    /// Every repository of the pool, one after the other.
    pub fn rows(&self, ctx: &Context) -> SequentialRows {
        SequentialRows {
            ctx: ctx.clone(),
            factory: self.factory(),
            repos: ctx.session().pool().iter().cloned().collect(),
            current: None,
        }
    }

    /// Every repository of the pool, fanned out over worker threads.
    pub fn parallel_rows(&self, ctx: &Context) -> ExecuteResult<RowRepoIter> {
        RowRepoIter::new(ctx, self.factory())
    }
}

/// Rows of one repository after the other.
pub struct SequentialRows {
    ctx: Context,
    factory: RowIterFactory,
    repos: VecDeque<Repository>,
    current: Option<Box<dyn RowIter>>,
}

impl SequentialRows {
    fn skip(&self, repo: &Repository, err: ExecuteError) -> ExecuteResult<()> {
        if err.is_skippable() && self.ctx.session().skip_git_errors() {
            tracing::warn!(repo = repo.id(), error = %err, "skipped repository");
            return Ok(());
        }
        Err(err)
    }
}

impl RowIter for SequentialRows {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        loop {
            self.ctx.check()?;
            if let Some(current) = self.current.as_mut() {
                if let Some(row) = current.next_row()? {
                    return Ok(Some(row));
                }
                if let Some(mut done) = self.current.take() {
                    done.close()?;
                }
            }

            let Some(repo) = self.repos.pop_front() else {
                return Ok(None);
            };
            match (self.factory)(&self.ctx, &repo) {
                Ok(rows) => self.current = Some(rows),
                Err(e) => self.skip(&repo, e)?,
            }
        }
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.repos.clear();
        match self.current.take() {
            Some(mut current) => current.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Value, TABLE_NAMES};
    use crate::executor::collect_rows;
    use crate::session::Session;
    use crate::test_support::{pool_with, scenario, session_with, truncated_pack_repo};

    #[test]
    fn test_every_table_matches_its_schema() {
        let s = scenario();
        let ctx = Context::new(session_with(&[("repo", s.path())]));

        for name in TABLE_NAMES {
            let table = Table::open(name, None).unwrap();
            let rows = collect_rows(table.rows(&ctx)).unwrap();
            assert!(!rows.is_empty(), "{} is empty", name);
            for row in &rows {
                assert_eq!(row.len(), table.schema().len(), "{}", name);
                for (col, value) in table.schema().columns().iter().zip(row) {
                    assert!(col.data_type.matches(value), "{}: {} does not fit {:?}", name, col, value);
                }
            }
        }
    }

    #[test]
    fn test_table_filters() {
        let s = scenario();
        let ctx = Context::new(session_with(&[("repo", s.path())]));

        let head = Table::open("ref_commits", Some("ref_name = 'HEAD'")).unwrap();
        let rows = collect_rows(head.rows(&ctx)).unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0][3], Value::Int(0));

        let files = Table::open("commit_files", Some("file_path = 'docs/guide.md'")).unwrap();
        assert_eq!(collect_rows(files.rows(&ctx)).unwrap().len(), 4);

        let commits = Table::open("commits", Some("commit_message = 'commit 0'")).unwrap();
        let rows = collect_rows(commits.parallel_rows(&ctx).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_broken_repository_next_to_healthy_one() {
        let s = scenario();
        let (broken, _git) = truncated_pack_repo();
        let pool = pool_with(&[("broken", broken.path()), ("healthy", s.path())]);
        let healthy_only = Context::new(session_with(&[("healthy", s.path())]));
        let lenient = Context::new(Arc::new(Session::new(pool.clone()).with_skip_git_errors(true)));
        let strict = Context::new(Arc::new(Session::new(pool)));

        for name in ["commits", "blobs", "tree_entries", "files"] {
            let table = Table::open(name, None).unwrap();
            let expected = collect_rows(table.rows(&healthy_only)).unwrap();
            assert!(!expected.is_empty(), "{}", name);

            let rows = collect_rows(table.rows(&lenient)).unwrap();
            assert_eq!(rows.len(), expected.len(), "{}", name);
            assert!(rows.iter().all(|r| r[0] == Value::from("healthy")), "{}", name);

            let mut iter = table.rows(&strict);
            let mut seen = 0;
            let err = loop {
                match iter.next_row() {
                    Ok(Some(_)) => seen += 1,
                    Ok(None) => panic!("{}: broken repository went unnoticed", name),
                    Err(e) => break e,
                }
            };
            assert!(err.is_skippable(), "{}: {}", name, err);
            assert_eq!(seen, 0, "{}", name);
        }

        let commits = Table::open("commits", None).unwrap();
        assert_eq!(collect_rows(commits.rows(&lenient)).unwrap().len(), 9);
    }

    #[test]
    fn test_unknown_table_and_bad_filter() {
        assert!(matches!(Table::open("nope", None), Err(ExecuteError::TableNotFound(_))));
        assert!(matches!(
            Table::open("commits", Some("no_such_column = 1")),
            Err(ExecuteError::Parse(_))
        ));
    }
}
