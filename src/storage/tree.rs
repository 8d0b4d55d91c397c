//! Tree entries.

use git2::Oid;

use super::errors::{StorageError, StorageResult};
use super::types::{MODE_SUBMODULE, MODE_TREE};

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntryInfo {
    pub name: String,
    pub id: Oid,
    pub mode: i32,
}

impl TreeEntryInfo {
    pub(crate) fn from_git2(entry: &git2::TreeEntry<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
            id: entry.id(),
            mode: entry.filemode(),
        }
    }

    /// true for subdirectories
    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }

    /// true for gitlinks
    pub fn is_submodule(&self) -> bool {
        self.mode == MODE_SUBMODULE
    }
}

/// Read all entries of a tree through libgit2.
pub(crate) fn tree_entries(repo: &git2::Repository, id: Oid) -> StorageResult<Vec<TreeEntryInfo>> {
    let tree = repo.find_tree(id)?;
    Ok(tree.iter().map(|e| TreeEntryInfo::from_git2(&e)).collect())
}

/// Parse the canonical tree encoding: `<octal mode> <name>\0<20 byte id>`
/// repeated until the end of the payload.
pub fn parse_tree(oid: Oid, data: &[u8]) -> StorageResult<Vec<TreeEntryInfo>> {
    let malformed = |reason: &str| StorageError::MalformedObject {
        kind: "tree",
        oid,
        reason: reason.to_string(),
    };

    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let sp = data[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("missing mode separator"))?;
        let mode_str = std::str::from_utf8(&data[pos..pos + sp]).map_err(|_| malformed("bad mode"))?;
        let mode = i32::from_str_radix(mode_str, 8).map_err(|_| malformed("bad mode"))?;
        pos += sp + 1;

        let nul = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("missing name terminator"))?;
        let name = String::from_utf8_lossy(&data[pos..pos + nul]).into_owned();
        pos += nul + 1;

        if pos + 20 > data.len() {
            return Err(malformed("truncated entry id"));
        }
        let id = Oid::from_bytes(&data[pos..pos + 20])?;
        pos += 20;

        entries.push(TreeEntryInfo { name, id, mode });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, init_repo};

    #[test]
    fn test_parse_matches_libgit2() {
        let (_dir, repo) = init_repo();
        let commit = commit_files(
            &repo,
            &[("README", b"hi"), ("src/lib.rs", b"fn x() {}"), ("src/bin/main.rs", b"fn main() {}")],
            "init",
            &[],
        );
        let tree_id = repo.find_commit(commit).unwrap().tree_id();

        let odb = repo.odb().unwrap();
        let raw = odb.read(tree_id).unwrap();
        let parsed = parse_tree(tree_id, raw.data()).unwrap();
        let expected = tree_entries(&repo, tree_id).unwrap();

        assert_eq!(parsed, expected);
        let names: Vec<_> = parsed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README", "src"]);
        assert!(parsed[1].is_tree());
    }

    #[test]
    fn test_parse_truncated() {
        let mut data = b"100644 a.txt\0".to_vec();
        data.extend_from_slice(&[1u8; 10]);
        let err = parse_tree(Oid::zero(), &data).unwrap_err();
        assert!(err.is_corrupt());
    }
}
