//! Index build path: a bound cursor becomes a stream of
//! `(column values, encoded key)` pairs.

use git2::Oid;

use super::error::{IndexError, IndexResult};
use super::key::{FileKey, IndexKey, PackOffsetKey, RefCommitKey, RemoteKey, TreeEntryKey};
use crate::catalog::{commit_files_schema, commits_schema, ref_commits_schema, Schema, Value};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::squash::{
    AllBlobsIter, AllCommitsIter, AllFilesIter, AllRemotesIter, AllTreeEntriesIter, ChainableIter, CommitFilesIter,
    CommitsIter, RefCommitsIter, RefsIter, TreeEntriesIter,
};
use crate::storage::{Repository, RepositoryIndex};

/// A cursor whose rows can be indexed.
pub trait Indexable: ChainableIter {
    /// Layout of [`Indexable::index_row`].
    fn index_schema(&self) -> Schema {
        self.schema()
    }

    /// The part of the current row that belongs to the indexed table.
    fn index_row(&self) -> &[Value] {
        self.row()
    }

    /// Encoded key of the current row.
    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>>;
}

fn object_key(repo_id: &str, index: &RepositoryIndex, oid: Oid) -> IndexResult<PackOffsetKey> {
    Ok(PackOffsetKey::new(repo_id, index.find(oid)?, oid))
}

impl Indexable for AllCommitsIter {
    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let commit = self.commit().ok_or(IndexError::NotPositioned)?;
        object_key(repo_id, index, commit.id.raw())?.encode()
    }
}

impl Indexable for AllBlobsIter {
    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let blob = self.current_blob().ok_or(IndexError::NotPositioned)?;
        object_key(repo_id, index, blob)?.encode()
    }
}

impl Indexable for AllTreeEntriesIter {
    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let (tree, pos) = self.tree_id().zip(self.position()).ok_or(IndexError::NotPositioned)?;
        TreeEntryKey {
            tree: object_key(repo_id, index, tree)?,
            pos: pos as i64,
        }
        .encode()
    }
}

impl Indexable for AllRemotesIter {
    fn index_key(&self, repo_id: &str, _index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let (pos, url_pos) = self.position().ok_or(IndexError::NotPositioned)?;
        RemoteKey {
            repository: repo_id.to_string(),
            pos: pos as i64,
            url_pos: url_pos as i64,
        }
        .encode()
    }
}

impl<R: RefsIter> Indexable for RefCommitsIter<R> {
    fn index_schema(&self) -> Schema {
        ref_commits_schema()
    }

    fn index_row(&self) -> &[Value] {
        // ref_commits columns sit between the parent's row and the commit
        let row = self.row();
        let start = row.len().saturating_sub(ref_commits_schema().len() + commits_schema().len());
        let end = (start + ref_commits_schema().len()).min(row.len());
        &row[start..end]
    }

    fn index_key(&self, repo_id: &str, _index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let (name, commit, index) = self.position().ok_or(IndexError::NotPositioned)?;
        RefCommitKey {
            repository: repo_id.to_string(),
            commit,
            name: name.to_string(),
            index,
        }
        .encode()
    }
}

impl<C: CommitsIter> Indexable for CommitFilesIter<C> {
    fn index_schema(&self) -> Schema {
        commit_files_schema()
    }

    fn index_row(&self) -> &[Value] {
        let row = self.row();
        &row[row.len().saturating_sub(commit_files_schema().len())..]
    }

    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let (item, commit, root) = self.current_file().ok_or(IndexError::NotPositioned)?;
        let blob = object_key(repo_id, index, item.entry.id)?;
        FileKey {
            repository: blob.repository,
            packfile: blob.packfile,
            hash: item.entry.id,
            offset: blob.offset,
            name: item.path.clone(),
            mode: i64::from(item.entry.mode),
            tree: root,
            commit: Some(commit),
        }
        .encode()
    }
}

impl Indexable for AllFilesIter {
    fn index_key(&self, repo_id: &str, index: &RepositoryIndex) -> IndexResult<Vec<u8>> {
        let (item, root) = self.current_file().ok_or(IndexError::NotPositioned)?;
        let blob = object_key(repo_id, index, item.entry.id)?;
        FileKey {
            repository: blob.repository,
            packfile: blob.packfile,
            hash: item.entry.id,
            offset: blob.offset,
            name: item.path.clone(),
            mode: i64::from(item.entry.mode),
            tree: root,
            commit: None,
        }
        .encode()
    }
}

/// Values of `columns` in `row`, looked up by name in `schema`.
pub fn row_index_values(row: &[Value], columns: &[String], schema: &Schema) -> IndexResult<Vec<Value>> {
    if row.len() != schema.len() {
        return Err(IndexError::RowLength {
            expected: schema.len(),
            found: row.len(),
        });
    }

    columns
        .iter()
        .map(|name| {
            let idx = schema.index_of(name).ok_or_else(|| IndexError::ColumnNotFound {
                column: name.clone(),
                table: schema
                    .columns()
                    .first()
                    .map(|c| c.source.clone())
                    .unwrap_or_default(),
            })?;
            Ok(row[idx].clone())
        })
        .collect()
}

/// Drives a bound cursor and yields, for each of its rows, the values of
/// the indexed columns and the row's encoded key.
pub struct KeyValueIter<I> {
    cursor: Option<I>,
    repo_id: String,
    index: RepositoryIndex,
    columns: Vec<String>,
    schema: Schema,
}

impl<I: Indexable> KeyValueIter<I> {
    pub fn new(template: &I, ctx: &Context, repo: &Repository, columns: &[&str]) -> ExecuteResult<Self> {
        let index = RepositoryIndex::open(repo)?;
        let cursor = template.new(ctx, repo)?;
        let schema = cursor.index_schema();
        Ok(Self {
            cursor: Some(cursor),
            repo_id: repo.id().to_string(),
            index,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            schema,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next `(values, key)` pair. The cursor is closed before any error is
    /// returned, after which the iterator is exhausted.
    pub fn next_entry(&mut self) -> ExecuteResult<Option<(Vec<Value>, Vec<u8>)>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        let entry = Self::entry(cursor, &self.repo_id, &self.index, &self.columns, &self.schema);
        if let Err(e) = &entry {
            tracing::debug!(repo = %self.repo_id, error = %e, "index build failed");
            if let Err(close_err) = self.close() {
                tracing::debug!(error = %close_err, "closing cursor after error");
            }
        }
        entry
    }

    fn entry(
        cursor: &mut I,
        repo_id: &str,
        index: &RepositoryIndex,
        columns: &[String],
        schema: &Schema,
    ) -> ExecuteResult<Option<(Vec<Value>, Vec<u8>)>> {
        if !cursor.advance()? {
            return Ok(None);
        }
        let values = row_index_values(cursor.index_row(), columns, schema)?;
        let key = cursor.index_key(repo_id, index)?;
        Ok(Some((values, key)))
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn close(&mut self) -> ExecuteResult<()> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}
