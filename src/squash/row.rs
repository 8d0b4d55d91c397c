//! Row construction for squashed cursors and index mappers.

use crate::catalog::{Row, Value};
use crate::config::BlobsConfig;
use crate::storage::{blob, mode_string, CommitInfo, RefInfo, RemoteInfo, TreeEntryInfo};
use git2::Oid;

/// Builds a row of a known width.
///
/// The buffer is sized once from the schema, so a child level never grows
/// the vector while copying its parent's values in.
#[derive(Debug)]
pub struct RowBuilder {
    values: Vec<Value>,
    width: usize,
}

impl RowBuilder {
    pub fn with_capacity(width: usize) -> Self {
        Self {
            values: Vec::with_capacity(width),
            width,
        }
    }

    /// Copy the parent's values in.
    pub fn extend_from(&mut self, parent: &[Value]) -> &mut Self {
        self.values.extend(parent.iter().cloned());
        self
    }

    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.values.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn build(self) -> Row {
        debug_assert_eq!(self.values.len(), self.width, "row width does not match its schema");
        self.values
    }

    pub fn push_remote(&mut self, repo_id: &str, remote: &RemoteInfo, pos: usize) -> &mut Self {
        let url = remote.url(pos).map_or(Value::Null, Value::from);
        let fetch = remote.fetch_refspec(pos).map_or(Value::Null, Value::from);
        self.push(repo_id)
            .push(remote.name.as_str())
            .push(url.clone())
            .push(url)
            .push(fetch.clone())
            .push(fetch)
    }

    pub fn push_ref(&mut self, repo_id: &str, reference: &RefInfo) -> &mut Self {
        self.push(repo_id).push(reference.name.as_str()).push(reference.target)
    }

    pub fn push_commit(&mut self, repo_id: &str, commit: &CommitInfo) -> &mut Self {
        let parents = commit
            .parent_ids
            .iter()
            .map(|p| Value::Text(p.to_string()))
            .collect();
        self.push(repo_id)
            .push(commit.id.raw())
            .push(commit.author.name.as_str())
            .push(commit.author.email.as_str())
            .push(commit.author.when)
            .push(commit.committer.name.as_str())
            .push(commit.committer.email.as_str())
            .push(commit.committer.when)
            .push(commit.message.as_str())
            .push(commit.tree_id.raw())
            .push(Value::Array(parents))
    }

    pub fn push_ref_commit(&mut self, repo_id: &str, commit: Oid, ref_name: &str, index: i64) -> &mut Self {
        self.push(repo_id).push(commit).push(ref_name).push(index)
    }

    pub fn push_commit_tree(&mut self, repo_id: &str, commit: Oid, tree: Oid) -> &mut Self {
        self.push(repo_id).push(commit).push(tree)
    }

    pub fn push_commit_blob(&mut self, repo_id: &str, commit: Oid, blob: Oid) -> &mut Self {
        self.push(repo_id).push(commit).push(blob)
    }

    pub fn push_tree_entry(&mut self, repo_id: &str, tree: Oid, entry: &TreeEntryInfo) -> &mut Self {
        self.push(repo_id)
            .push(entry.name.as_str())
            .push(entry.id)
            .push(tree)
            .push(mode_string(entry.mode))
    }

    /// `content` is only used when `read_content` holds and the blob passes
    /// the configured size and binary rules.
    pub fn push_blob(
        &mut self,
        repo_id: &str,
        oid: Oid,
        size: usize,
        content: Vec<u8>,
        read_content: bool,
        cfg: &BlobsConfig,
    ) -> &mut Self {
        self.push(repo_id)
            .push(oid)
            .push(size as i64)
            .push(Value::Blob(blob::row_content(content, read_content, cfg)))
    }

    pub fn push_commit_file(&mut self, repo_id: &str, commit: Oid, path: &str, blob: Oid, tree: Oid) -> &mut Self {
        self.push(repo_id).push(commit).push(path).push(blob).push(tree)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_file(
        &mut self,
        repo_id: &str,
        path: &str,
        blob: Oid,
        tree: Oid,
        mode: i32,
        content: Vec<u8>,
        size: usize,
        read_content: bool,
        cfg: &BlobsConfig,
    ) -> &mut Self {
        self.push(repo_id)
            .push(path)
            .push(blob)
            .push(tree)
            .push(mode_string(mode))
            .push(Value::Blob(blob::row_content(content, read_content, cfg)))
            .push(size as i64)
    }
}
