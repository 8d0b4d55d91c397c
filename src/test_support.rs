//! Fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

use crate::session::Session;
use crate::storage::RepositoryPool;

pub fn signature() -> Signature<'static> {
    Signature::new("Test Author", "author@example.com", &Time::new(1_500_000_000, 0)).unwrap()
}

/// Fresh non-bare repository whose HEAD points at `refs/heads/master`.
pub fn init_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = Repository::init_opts(dir.path(), &opts).unwrap();
    (dir, repo)
}

fn write_tree(repo: &Repository, files: &[(&str, &[u8])]) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let mut dirs: BTreeMap<&str, Vec<(&str, &[u8])>> = BTreeMap::new();

    for (path, content) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, *content)),
            None => {
                let blob = repo.blob(content).unwrap();
                builder.insert(*path, blob, 0o100644).unwrap();
            }
        }
    }
    for (dir, entries) in dirs {
        let sub = write_tree(repo, &entries);
        builder.insert(dir, sub, 0o040000).unwrap();
    }
    builder.write().unwrap()
}

/// Commit `files` (paths may contain `/`) on top of `parents` and move
/// `refs/heads/master` to the new commit.
pub fn commit_files(repo: &Repository, files: &[(&str, &[u8])], message: &str, parents: &[Oid]) -> Oid {
    let tree = repo.find_tree(write_tree(repo, files)).unwrap();
    let parents: Vec<git2::Commit<'_>> = parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
    let sig = signature();
    let oid = repo.commit(None, &sig, &sig, message, &tree, &parent_refs).unwrap();
    repo.reference("refs/heads/master", oid, true, message).unwrap();
    oid
}

/// Move every object into a single packfile and delete the loose copies.
pub fn pack_repository(repo: &Repository) {
    let odb = repo.odb().unwrap();
    let mut oids = Vec::new();
    odb.foreach(|oid| {
        oids.push(*oid);
        true
    })
    .unwrap();

    let mut builder = repo.packbuilder().unwrap();
    for oid in oids {
        builder.insert_object(oid, None).unwrap();
    }

    let objects = repo.path().join("objects");
    let pack_dir = objects.join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    builder.write(&pack_dir, 0o644).unwrap();

    for entry in std::fs::read_dir(&objects).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            std::fs::remove_dir_all(entry.path()).unwrap();
        }
    }
}

/// Two commits packed into one packfile, which is then cut in half.
pub fn truncated_pack_repo() -> (TempDir, Repository) {
    let (dir, repo) = init_repo();
    let c1 = commit_files(&repo, &[("a", b"one")], "one", &[]);
    commit_files(&repo, &[("a", b"two")], "two", &[c1]);
    pack_repository(&repo);

    let pack_dir = repo.path().join("objects").join("pack");
    for entry in std::fs::read_dir(&pack_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "pack") {
            let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            let len = file.metadata().unwrap().len();
            file.set_len(len / 2).unwrap();
        }
    }
    (dir, repo)
}

pub fn pool_with(repos: &[(&str, &Path)]) -> Arc<RepositoryPool> {
    let mut pool = RepositoryPool::new();
    for (id, path) in repos {
        pool.add_git(*id, path).unwrap();
    }
    Arc::new(pool)
}

pub fn session_with(repos: &[(&str, &Path)]) -> Arc<Session> {
    Arc::new(Session::new(pool_with(repos)))
}

/// Repository with nine linear commits, `refs/heads/master` on the last
/// one, `refs/remotes/origin/master` two commits behind and an `origin`
/// remote.
pub struct Scenario {
    pub dir: TempDir,
    pub repo: Repository,
    /// oldest first
    pub commits: Vec<Oid>,
}

impl Scenario {
    pub fn head(&self) -> Oid {
        self.commits[self.commits.len() - 1]
    }

    pub fn origin(&self) -> Oid {
        self.commits[6]
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn scenario() -> Scenario {
    let (dir, repo) = init_repo();
    let mut commits: Vec<Oid> = Vec::new();

    for i in 0..9 {
        let readme = format!("# project\n\nrevision {}\n", i);
        let lib = format!("pub fn value() -> u32 {{ {} }}\n", i / 3);
        let util = format!("pub const STEP: u32 = {};\n", i / 4);
        let mut files: Vec<(&str, &[u8])> = vec![
            ("README.md", readme.as_bytes()),
            ("LICENSE", &b"MIT\n"[..]),
            ("src/lib.rs", lib.as_bytes()),
            ("src/util/mod.rs", util.as_bytes()),
        ];
        if i >= 5 {
            files.push(("docs/guide.md", &b"guide\n"[..]));
        }
        let parents: Vec<Oid> = commits.last().copied().into_iter().collect();
        commits.push(commit_files(&repo, &files, &format!("commit {}", i), &parents));
    }

    repo.reference("refs/remotes/origin/master", commits[6], true, "fetch")
        .unwrap();
    repo.remote("origin", "https://example.com/project.git").unwrap();

    Scenario { dir, repo, commits }
}
