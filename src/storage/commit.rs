//! Commit metadata, read either through libgit2 or straight from raw
//! object bytes (the index-driven path decodes packfile entries itself).

use git2::Oid;

use super::errors::{StorageError, StorageResult};
use super::types::{timestamp, CommitId, Signature, TreeId};

/// Information about a commit, detached from any repository handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            author: Signature::from_git2(&commit.author()),
            committer: Signature::from_git2(&commit.committer()),
            message: String::from_utf8_lossy(commit.message_raw_bytes()).into_owned(),
        }
    }

    /// Parse the canonical commit encoding.
    ///
    /// Unknown headers (`encoding`, `gpgsig`, `mergetag`, ...) and their
    /// continuation lines are skipped.
    pub fn parse(oid: Oid, data: &[u8]) -> StorageResult<Self> {
        let malformed = |reason: &str| StorageError::MalformedObject {
            kind: "commit",
            oid,
            reason: reason.to_string(),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        let mut rest = data;
        loop {
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| malformed("unterminated header"))?;
            let line = &rest[..end];
            rest = &rest[end + 1..];

            if line.is_empty() {
                break;
            }
            if line[0] == b' ' {
                // continuation of a multi-line header
                continue;
            }

            let (key, value) = match line.iter().position(|&b| b == b' ') {
                Some(sp) => (&line[..sp], &line[sp + 1..]),
                None => (line, &line[line.len()..]),
            };

            match key {
                b"tree" => tree = Some(parse_hex_oid(value).ok_or_else(|| malformed("bad tree id"))?),
                b"parent" => {
                    parents.push(CommitId::new(
                        parse_hex_oid(value).ok_or_else(|| malformed("bad parent id"))?,
                    ));
                }
                b"author" => author = Some(parse_signature(value).ok_or_else(|| malformed("bad author"))?),
                b"committer" => {
                    committer = Some(parse_signature(value).ok_or_else(|| malformed("bad committer"))?)
                }
                _ => {}
            }
        }

        Ok(Self {
            id: CommitId::new(oid),
            tree_id: TreeId::new(tree.ok_or_else(|| malformed("missing tree"))?),
            parent_ids: parents,
            author: author.ok_or_else(|| malformed("missing author"))?,
            committer: committer.ok_or_else(|| malformed("missing committer"))?,
            message: String::from_utf8_lossy(rest).into_owned(),
        })
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

fn parse_hex_oid(value: &[u8]) -> Option<Oid> {
    let hex = std::str::from_utf8(value).ok()?;
    if hex.len() != 40 {
        return None;
    }
    Oid::from_str(hex).ok()
}

/// `Name <email> 1234567890 +0200`
fn parse_signature(value: &[u8]) -> Option<Signature> {
    let lt = value.iter().position(|&b| b == b'<')?;
    let gt = value.iter().rposition(|&b| b == b'>')?;
    if gt < lt {
        return None;
    }

    let name = String::from_utf8_lossy(value[..lt].trim_ascii_end()).into_owned();
    let email = String::from_utf8_lossy(&value[lt + 1..gt]).into_owned();

    let tail = std::str::from_utf8(&value[gt + 1..]).ok()?;
    let seconds = tail
        .split_ascii_whitespace()
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);

    Some(Signature {
        name,
        email,
        when: timestamp(seconds),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, init_repo};

    #[test]
    fn test_parse_matches_libgit2() {
        let (_dir, repo) = init_repo();
        let first = commit_files(&repo, &[("a.txt", b"a")], "first\n", &[]);
        let second = commit_files(&repo, &[("a.txt", b"b")], "second\n\nbody\n", &[first]);

        let odb = repo.odb().unwrap();
        let raw = odb.read(second).unwrap();
        let parsed = CommitInfo::parse(second, raw.data()).unwrap();
        let expected = CommitInfo::from_git2(&repo.find_commit(second).unwrap());

        assert_eq!(parsed, expected);
        assert_eq!(parsed.parent_ids, vec![CommitId::new(first)]);
        assert_eq!(parsed.message, "second\n\nbody\n");
    }

    #[test]
    fn test_parse_skips_unknown_headers() {
        let data = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A U Thor <a@example.com> 1500000000 +0200\n\
committer C O Mitter <c@example.com> 1500000100 -0100\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n \n -----END PGP SIGNATURE-----\n\
\n\
signed\n";
        let info = CommitInfo::parse(Oid::zero(), data).unwrap();
        assert_eq!(info.author.name, "A U Thor");
        assert_eq!(info.committer.email, "c@example.com");
        assert_eq!(info.committer.when.timestamp(), 1500000100);
        assert!(info.parent_ids.is_empty());
        assert_eq!(info.message, "signed\n");
    }

    #[test]
    fn test_parse_rejects_missing_tree() {
        let data = b"author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmsg";
        let err = CommitInfo::parse(Oid::zero(), data).unwrap_err();
        assert!(err.is_corrupt());
    }
}
