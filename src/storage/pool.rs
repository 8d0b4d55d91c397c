//! Registry of the repositories a session can see.

use std::collections::HashMap;
use std::path::Path;

use super::errors::{StorageError, StorageResult};
use super::repository::Repository;

/// Insertion-ordered set of repositories keyed by id.
///
/// Populated up front, then only read. Sharing it behind an `Arc` is enough
/// for concurrent readers.
#[derive(Debug, Default)]
pub struct RepositoryPool {
    repositories: Vec<Repository>,
    positions: HashMap<String, usize>,
}

impl RepositoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `repo` under its id. A repository already registered with
    /// the same id is replaced in place, keeping its position.
    pub fn add(&mut self, repo: Repository) {
        match self.positions.get(repo.id()) {
            Some(&pos) => self.repositories[pos] = repo,
            None => {
                self.positions.insert(repo.id().to_string(), self.repositories.len());
                self.repositories.push(repo);
            }
        }
    }

    /// Open the repository at `path` and register it as `id`.
    pub fn add_git(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> StorageResult<()> {
        let repo = Repository::open(id, path)?;
        self.add(repo);
        Ok(())
    }

    pub fn get(&self, id: &str) -> StorageResult<Repository> {
        self.positions
            .get(id)
            .and_then(|&pos| self.repositories.get(pos))
            .cloned()
            .ok_or_else(|| StorageError::RepositoryNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repository> + '_ {
        self.repositories.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.repositories.iter().map(|r| r.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
