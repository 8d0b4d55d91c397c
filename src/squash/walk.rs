//! Resumable tree and history traversals.
//!
//! Both walkers keep an explicit stack instead of recursing, so a cursor can
//! stop after any single item and pick up from the same place on its next
//! `advance`.

use std::collections::HashSet;

use git2::Oid;

use crate::storage::{CommitInfo, Repository, StorageResult, TreeEntryInfo};

/// An entry reached by a [`TreeWalker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkItem {
    /// tree holding the entry
    pub tree: Oid,
    pub entry: TreeEntryInfo,
    /// position of the entry in its tree
    pub pos: usize,
    /// slash separated path from the root tree
    pub path: String,
    /// for subtree entries: whether the walk descends into it, i.e. it was
    /// not seen before in this walk
    pub first_visit: bool,
}

#[derive(Debug)]
struct TreeFrame {
    tree: Oid,
    prefix: String,
    entries: Vec<TreeEntryInfo>,
    pos: usize,
}

/// Depth-first, pre-order walk over every tree reachable from a root.
#[derive(Debug)]
pub struct TreeWalker {
    stack: Vec<TreeFrame>,
    /// trees already descended into; None walks every path
    seen: Option<HashSet<Oid>>,
    descend: Option<(Oid, String)>,
}

impl TreeWalker {
    /// `dedup` visits each distinct subtree once per walk. Without it a
    /// subtree shared by two paths is walked under both.
    pub fn new(dedup: bool) -> Self {
        Self {
            stack: Vec::new(),
            seen: dedup.then(HashSet::new),
            descend: None,
        }
    }

    /// Start over from `root`, forgetting every tree seen so far.
    pub fn reset(&mut self, root: Oid) {
        self.stack.clear();
        if let Some(seen) = self.seen.as_mut() {
            seen.clear();
            seen.insert(root);
        }
        self.descend = Some((root, String::new()));
    }

    pub fn is_done(&self) -> bool {
        self.stack.is_empty() && self.descend.is_none()
    }

    /// Next entry, or None once the walk is exhausted. A tree that fails to
    /// load is dropped from the walk; calling `next` again continues with
    /// the rest.
    pub fn next(&mut self, repo: &Repository) -> StorageResult<Option<WalkItem>> {
        loop {
            if let Some((tree, prefix)) = self.descend.take() {
                let entries = repo.tree_entries(tree)?;
                self.stack.push(TreeFrame {
                    tree,
                    prefix,
                    entries,
                    pos: 0,
                });
            }

            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            if frame.pos >= frame.entries.len() {
                self.stack.pop();
                continue;
            }

            let pos = frame.pos;
            let entry = frame.entries[pos].clone();
            frame.pos += 1;
            let tree = frame.tree;
            let path = if frame.prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", frame.prefix, entry.name)
            };

            let mut first_visit = false;
            if entry.is_tree() {
                first_visit = match self.seen.as_mut() {
                    Some(seen) => seen.insert(entry.id),
                    None => true,
                };
                if first_visit {
                    self.descend = Some((entry.id, path.clone()));
                }
            }

            return Ok(Some(WalkItem {
                tree,
                entry,
                pos,
                path,
                first_visit,
            }));
        }
    }
}

#[derive(Debug)]
struct HistoryFrame {
    distance: i64,
    pos: usize,
    hashes: Vec<Oid>,
}

/// Walks the ancestors of a commit, reporting each commit once with the
/// distance at which it was first reached.
///
/// Parents are explored depth first, first parent first, so the distance
/// of a commit reachable through several paths is the one of the path the
/// walk takes first, not necessarily the shortest.
#[derive(Debug)]
pub struct HistoryWalker {
    stack: Vec<HistoryFrame>,
    visited: HashSet<Oid>,
}

impl HistoryWalker {
    pub fn new(start: Oid) -> Self {
        Self {
            stack: vec![HistoryFrame {
                distance: 0,
                pos: 0,
                hashes: vec![start],
            }],
            visited: HashSet::new(),
        }
    }

    /// Next commit with its distance. A commit that fails to load is marked
    /// visited and its parents are not explored.
    pub fn next(&mut self, repo: &Repository) -> StorageResult<Option<(CommitInfo, i64)>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            if frame.pos >= frame.hashes.len() {
                self.stack.pop();
                continue;
            }

            let hash = frame.hashes[frame.pos];
            frame.pos += 1;
            let distance = frame.distance;

            if !self.visited.insert(hash) {
                continue;
            }

            let commit = repo.find_commit(hash)?;
            if !commit.parent_ids.is_empty() {
                self.stack.push(HistoryFrame {
                    distance: distance + 1,
                    pos: 0,
                    hashes: commit.parent_ids.iter().map(|p| p.raw()).collect(),
                });
            }
            return Ok(Some((commit, distance)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, init_repo};

    #[test]
    fn test_tree_walk_paths() {
        let (dir, git) = init_repo();
        let c = commit_files(&git, &[("a", b"1"), ("d/b", b"2"), ("d/e/c", b"3")], "c", &[]);
        let root = git.find_commit(c).unwrap().tree_id();
        let repo = Repository::from_git2("r", dir.path(), git);

        let mut walker = TreeWalker::new(true);
        walker.reset(root);
        let mut paths = Vec::new();
        while let Some(item) = walker.next(&repo).unwrap() {
            paths.push(item.path);
        }
        assert_eq!(paths, vec!["a", "d", "d/b", "d/e", "d/e/c"]);
        assert!(walker.is_done());
    }

    #[test]
    fn test_tree_walk_dedup() {
        let (dir, git) = init_repo();
        // x and y hold identical trees
        let c = commit_files(&git, &[("x/f", b"same"), ("y/f", b"same")], "c", &[]);
        let root = git.find_commit(c).unwrap().tree_id();
        let repo = Repository::from_git2("r", dir.path(), git);

        let count = |dedup: bool| {
            let mut walker = TreeWalker::new(dedup);
            walker.reset(root);
            let mut n = 0;
            while walker.next(&repo).unwrap().is_some() {
                n += 1;
            }
            n
        };
        assert_eq!(count(true), 3);
        assert_eq!(count(false), 4);
    }

    #[test]
    fn test_history_first_visited_distance() {
        let (dir, git) = init_repo();
        let base = commit_files(&git, &[("f", b"0")], "base", &[]);
        let left = commit_files(&git, &[("f", b"1")], "left", &[base]);
        let right = commit_files(&git, &[("f", b"2")], "right", &[base]);
        let merge = commit_files(&git, &[("f", b"3")], "merge", &[left, right]);
        let repo = Repository::from_git2("r", dir.path(), git);

        let mut walker = HistoryWalker::new(merge);
        let mut seen = Vec::new();
        while let Some((commit, distance)) = walker.next(&repo).unwrap() {
            seen.push((commit.id.raw(), distance));
        }
        assert_eq!(seen, vec![(merge, 0), (left, 1), (base, 2), (right, 1)]);
    }
}
