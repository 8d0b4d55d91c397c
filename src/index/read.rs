//! Index read path: encoded keys back to rows.
//!
//! An [`IndexRowIter`] pulls keys from an [`IndexValueIter`] (the result
//! of an index lookup), decodes each one and hands it to a
//! [`KeyRowMapper`], which reads whatever objects the row needs through
//! the iterator's [`ObjectDecoder`].

use std::sync::Arc;

use git2::Oid;

use super::error::{IndexError, IndexResult};
use super::key::{FileKey, IndexKey, PackOffsetKey, RefCommitKey, RemoteKey, TreeEntryKey};
use crate::catalog::{
    blobs_schema, commit_files_schema, commits_schema, files_schema, ref_commits_schema, remotes_schema,
    tree_entries_schema, Row,
};
use crate::config::BlobsConfig;
use crate::executor::{matches_where, ExecuteError, ExecuteResult, RowIter};
use crate::session::Context;
use crate::sql::Expr;
use crate::squash::RowBuilder;
use crate::storage::{ObjectDecoder, RemoteInfo, RepositoryPool, StorageError, TreeEntryInfo};

/// Stream of encoded keys produced by an index lookup.
pub trait IndexValueIter: Send {
    fn next_value(&mut self) -> IndexResult<Option<Vec<u8>>>;

    fn close(&mut self) -> IndexResult<()>;
}

impl IndexValueIter for Box<dyn IndexValueIter> {
    fn next_value(&mut self) -> IndexResult<Option<Vec<u8>>> {
        (**self).next_value()
    }

    fn close(&mut self) -> IndexResult<()> {
        (**self).close()
    }
}

/// Turns a decoded key into the row it was built from.
pub trait KeyRowMapper: Send {
    type Key: IndexKey;

    fn to_row(&mut self, key: &Self::Key, decoder: &mut ObjectDecoder) -> ExecuteResult<Row>;
}

/// `commits` rows from [`PackOffsetKey`]s.
#[derive(Debug, Default)]
pub struct CommitsKeyMapper;

impl KeyRowMapper for CommitsKeyMapper {
    type Key = PackOffsetKey;

    fn to_row(&mut self, key: &PackOffsetKey, decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        let raw = decoder.decode(&key.repository, key.packfile, key.offset, key.hash)?;
        let commit = raw.to_commit()?;
        let mut b = RowBuilder::with_capacity(commits_schema().len());
        b.push_commit(&key.repository, &commit);
        Ok(b.build())
    }
}

/// `blobs` rows from [`PackOffsetKey`]s.
#[derive(Debug, Default)]
pub struct BlobsKeyMapper {
    read_content: bool,
    cfg: BlobsConfig,
}

impl BlobsKeyMapper {
    pub fn new(read_content: bool, cfg: BlobsConfig) -> Self {
        Self { read_content, cfg }
    }
}

impl KeyRowMapper for BlobsKeyMapper {
    type Key = PackOffsetKey;

    fn to_row(&mut self, key: &PackOffsetKey, decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        let raw = decoder.decode(&key.repository, key.packfile, key.offset, key.hash)?;
        let oid = raw.oid;
        let data = raw.into_blob()?;
        let size = data.len();
        let mut b = RowBuilder::with_capacity(blobs_schema().len());
        b.push_blob(&key.repository, oid, size, data, self.read_content, &self.cfg);
        Ok(b.build())
    }
}

#[derive(Debug)]
struct DecodedTree {
    key: PackOffsetKey,
    oid: Oid,
    entries: Vec<TreeEntryInfo>,
}

impl DecodedTree {
    fn is(&self, key: &PackOffsetKey) -> bool {
        if self.key.repository != key.repository {
            return false;
        }
        if key.is_packed() {
            self.key.packfile == key.packfile && self.key.offset == key.offset
        } else {
            self.key.hash == key.hash
        }
    }
}

/// `tree_entries` rows from [`TreeEntryKey`]s. Consecutive keys of the
/// same tree decode it once.
#[derive(Debug, Default)]
pub struct TreeEntriesKeyMapper {
    last: Option<DecodedTree>,
    decoded: usize,
}

impl TreeEntriesKeyMapper {
    /// number of trees decoded so far
    pub fn decoded(&self) -> usize {
        self.decoded
    }
}

impl KeyRowMapper for TreeEntriesKeyMapper {
    type Key = TreeEntryKey;

    fn to_row(&mut self, key: &TreeEntryKey, decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        let reuse = matches!(&self.last, Some(last) if last.is(&key.tree));
        if !reuse {
            let tree = &key.tree;
            let raw = decoder.decode(&tree.repository, tree.packfile, tree.offset, tree.hash)?;
            let entries = raw.to_tree()?;
            self.decoded += 1;
            self.last = Some(DecodedTree {
                key: tree.clone(),
                oid: raw.oid,
                entries,
            });
        }

        let Some(last) = self.last.as_ref() else {
            return Err(IndexError::NotPositioned.into());
        };
        let entry = usize::try_from(key.pos)
            .ok()
            .and_then(|pos| last.entries.get(pos))
            .ok_or_else(|| StorageError::MalformedObject {
                kind: "tree",
                oid: last.oid,
                reason: format!("no entry at position {}", key.pos),
            })?;
        let mut b = RowBuilder::with_capacity(tree_entries_schema().len());
        b.push_tree_entry(&key.tree.repository, last.oid, entry);
        Ok(b.build())
    }
}

/// `ref_commits` rows; the key is the whole row.
#[derive(Debug, Default)]
pub struct RefCommitsKeyMapper;

impl KeyRowMapper for RefCommitsKeyMapper {
    type Key = RefCommitKey;

    fn to_row(&mut self, key: &RefCommitKey, _decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        let mut b = RowBuilder::with_capacity(ref_commits_schema().len());
        b.push_ref_commit(&key.repository, key.commit, &key.name, key.index);
        Ok(b.build())
    }
}

/// `remotes` rows, read back from the repository configuration.
pub struct RemotesKeyMapper {
    pool: Arc<RepositoryPool>,
    cached: Option<(String, Vec<RemoteInfo>)>,
}

impl RemotesKeyMapper {
    pub fn new(pool: Arc<RepositoryPool>) -> Self {
        Self { pool, cached: None }
    }

    fn remotes(&mut self, repo_id: &str) -> ExecuteResult<&[RemoteInfo]> {
        let hit = matches!(&self.cached, Some((id, _)) if id == repo_id);
        if !hit {
            let remotes = self.pool.get(repo_id)?.remotes()?;
            self.cached = Some((repo_id.to_string(), remotes));
        }
        Ok(self.cached.as_ref().map(|(_, r)| r.as_slice()).unwrap_or_default())
    }
}

impl KeyRowMapper for RemotesKeyMapper {
    type Key = RemoteKey;

    fn to_row(&mut self, key: &RemoteKey, _decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        let unresolved = |reason: String| IndexError::Unresolved {
            repository: key.repository.clone(),
            reason,
        };
        let remotes = self.remotes(&key.repository)?;
        let remote = usize::try_from(key.pos)
            .ok()
            .and_then(|pos| remotes.get(pos))
            .ok_or_else(|| unresolved(format!("no remote at position {}", key.pos)))?;
        let url_pos = usize::try_from(key.url_pos)
            .ok()
            .filter(|&pos| pos < remote.row_count())
            .ok_or_else(|| unresolved(format!("remote {} has no url position {}", remote.name, key.url_pos)))?;

        let mut b = RowBuilder::with_capacity(remotes_schema().len());
        b.push_remote(&key.repository, remote, url_pos);
        Ok(b.build())
    }
}

/// `files` and `commit_files` rows from [`FileKey`]s. A key that carries a
/// commit is a commit_files row and needs no object; otherwise the blob is
/// decoded for its size and content.
#[derive(Debug, Default)]
pub struct FilesKeyMapper {
    read_content: bool,
    cfg: BlobsConfig,
}

impl FilesKeyMapper {
    pub fn new(read_content: bool, cfg: BlobsConfig) -> Self {
        Self { read_content, cfg }
    }
}

impl KeyRowMapper for FilesKeyMapper {
    type Key = FileKey;

    fn to_row(&mut self, key: &FileKey, decoder: &mut ObjectDecoder) -> ExecuteResult<Row> {
        if let Some(commit) = key.commit {
            let mut b = RowBuilder::with_capacity(commit_files_schema().len());
            b.push_commit_file(&key.repository, commit, &key.name, key.hash, key.tree);
            return Ok(b.build());
        }

        let data = decoder
            .decode(&key.repository, key.packfile, key.offset, key.hash)?
            .into_blob()?;
        let size = data.len();
        let mut b = RowBuilder::with_capacity(files_schema().len());
        b.push_file(
            &key.repository,
            &key.name,
            key.hash,
            key.tree,
            key.mode as i32,
            data,
            size,
            self.read_content,
            &self.cfg,
        );
        Ok(b.build())
    }
}

/// Rows materialized from an index lookup.
pub struct IndexRowIter<M> {
    ctx: Context,
    values: Box<dyn IndexValueIter>,
    mapper: M,
    decoder: ObjectDecoder,
    partition: Option<String>,
    filter: Option<Expr>,
}

impl<M: KeyRowMapper> IndexRowIter<M> {
    pub fn new(ctx: &Context, values: impl IndexValueIter + 'static, mapper: M) -> Self {
        Self {
            ctx: ctx.clone(),
            values: Box::new(values),
            mapper,
            decoder: ObjectDecoder::new(ctx.session().pool().clone()),
            partition: None,
            filter: None,
        }
    }

    /// Drop keys of every repository but `repo_id`.
    pub fn with_partition(mut self, repo_id: impl Into<String>) -> Self {
        self.partition = Some(repo_id.into());
        self
    }

    /// Keep only rows matching `filter`.
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub(crate) fn decoder(&self) -> &ObjectDecoder {
        &self.decoder
    }

    /// number of packfiles the decoder opened so far
    pub fn packfile_opens(&self) -> usize {
        self.decoder.opens()
    }

    fn next_mapped(&mut self) -> ExecuteResult<Option<Row>> {
        loop {
            self.ctx.check()?;
            let Some(value) = self.values.next_value()? else {
                return Ok(None);
            };
            let key = M::Key::decode(&value)?;
            if let Some(partition) = self.partition.as_deref() {
                if key.repository() != partition {
                    continue;
                }
            }

            let row = match self.mapper.to_row(&key, &mut self.decoder) {
                Ok(row) => row,
                Err(e) if e.is_skippable() && self.ctx.session().skip_git_errors() => {
                    tracing::warn!(repo = key.repository(), error = %e, "skipped index key");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match &self.filter {
                Some(filter) if !matches_where(filter, &row)? => continue,
                _ => return Ok(Some(row)),
            }
        }
    }
}

impl<M: KeyRowMapper> RowIter for IndexRowIter<M> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        match self.next_mapped() {
            Ok(row) => Ok(row),
            Err(e) => {
                self.decoder.close();
                if let Err(close_err) = self.values.close() {
                    tracing::debug!(error = %close_err, "closing index values after error");
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.decoder.close();
        self.values.close().map_err(ExecuteError::from)
    }
}
