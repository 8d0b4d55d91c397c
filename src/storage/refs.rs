//! Reference listing and resolution.

use git2::{ErrorCode, ObjectType, Oid, Repository};

use super::commit::CommitInfo;
use super::errors::StorageResult;
use super::types::RefInfo;

/// A reference as stored in the reference database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// points straight at an object
    Hash(RefInfo),
    /// points at another reference by name
    Symbolic { name: String, target: String },
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Reference::Hash(r) => &r.name,
            Reference::Symbolic { name, .. } => name,
        }
    }
}

pub(crate) fn list_references(repo: &Repository) -> StorageResult<Vec<Reference>> {
    let mut out = Vec::new();
    for reference in repo.references()? {
        let reference = reference?;
        let name = String::from_utf8_lossy(reference.name_bytes()).into_owned();
        match reference.target() {
            Some(target) => out.push(Reference::Hash(RefInfo { name, target })),
            None => {
                let target = reference
                    .symbolic_target_bytes()
                    .map(|t| String::from_utf8_lossy(t).into_owned())
                    .unwrap_or_default();
                out.push(Reference::Symbolic { name, target });
            }
        }
    }
    Ok(out)
}

/// Object HEAD points at after following symbolic refs. None for unborn or
/// missing HEAD.
pub(crate) fn head_target(repo: &Repository) -> StorageResult<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Peel tags until a commit is reached.
pub(crate) fn resolve_commit(repo: &Repository, oid: Oid) -> StorageResult<Option<CommitInfo>> {
    let mut object = repo.find_object(oid, None)?;
    loop {
        match object.kind() {
            Some(ObjectType::Commit) => {
                let commit = object
                    .into_commit()
                    .map_err(|_| git2::Error::from_str("object is not a commit"))?;
                return Ok(Some(CommitInfo::from_git2(&commit)));
            }
            Some(ObjectType::Tag) => {
                let tag = object
                    .into_tag()
                    .map_err(|_| git2::Error::from_str("object is not a tag"))?;
                object = tag.target()?;
            }
            _ => return Ok(None),
        }
    }
}
