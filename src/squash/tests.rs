use std::sync::Arc;

use super::*;
use crate::catalog::{
    blobs_schema, commits_schema, files_schema, ref_commits_schema, refs_schema, remotes_schema,
    repositories_schema, tree_entries_schema, Row,
};
use crate::executor::ExecuteError;
use crate::session::{Context, Session};
use crate::sql::Parser;
use crate::storage::RepositoryPool;
use crate::test_support::{
    commit_files, init_repo, pack_repository, scenario, session_with, truncated_pack_repo, Scenario,
};

fn context(s: &Scenario) -> (Context, Repository) {
    let session = session_with(&[("repo", s.path())]);
    let repo = session.pool().get("repo").unwrap();
    (Context::new(session), repo)
}

fn drain<I: ChainableIter>(template: &I, ctx: &Context, repo: &Repository) -> ExecuteResult<Vec<Row>> {
    let mut iter = template.new(ctx, repo)?;
    let mut rows = Vec::new();
    while iter.advance()? {
        assert_eq!(iter.row().len(), iter.schema().len());
        rows.push(iter.row().to_vec());
    }
    iter.close()?;
    Ok(rows)
}

fn filter(sql: &str, schema: &Schema) -> Expr {
    Parser::parse_filter(sql, schema).unwrap()
}

fn text(row: &[Value], idx: usize) -> String {
    row[idx].as_str().unwrap().to_string()
}

#[test]
fn test_head_history_distances() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let refs_filter = filter("ref_name = 'HEAD'", &repositories_schema().join(&refs_schema()));
    let chain = RefCommitsIter::from_parent(
        RepoRefsIter::from_parent(AllReposIter::default()).with_filter(refs_filter),
    );

    let schema = chain.schema();
    let index = repositories_schema().len() + refs_schema().len() + 3;
    assert_eq!(schema.column(index).unwrap().name, "history_index");

    let rows = drain(&chain, &ctx, &repo).unwrap();
    assert_eq!(rows.len(), 9);
    let distances: Vec<i64> = rows.iter().map(|r| r[index].as_i64().unwrap()).collect();
    assert_eq!(distances, (0..9).collect::<Vec<i64>>());

    let hash_idx = repositories_schema().len() + refs_schema().len() + 1;
    let hashes: Vec<String> = rows.iter().map(|r| text(r, hash_idx)).collect();
    let expected: Vec<String> = s.commits.iter().rev().map(|c| c.to_string()).collect();
    assert_eq!(hashes, expected);
}

#[test]
fn test_refs_head_first_and_symbolic_skipped() {
    let s = scenario();
    s.repo
        .reference_symbolic("refs/heads/alias", "refs/heads/master", true, "alias")
        .unwrap();
    let (ctx, repo) = context(&s);

    let rows = drain(&AllRefsIter::default(), &ctx, &repo).unwrap();
    let names: Vec<String> = rows.iter().map(|r| text(r, 1)).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0], "HEAD");
    assert_eq!(text(&rows[0], 2), s.head().to_string());
    assert!(names.contains(&"refs/heads/master".to_string()));
    assert!(names.contains(&"refs/remotes/origin/master".to_string()));
    assert!(!names.contains(&"refs/heads/alias".to_string()));
}

#[test]
fn test_remote_refs() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let remotes = drain(&AllRemotesIter::default(), &ctx, &repo).unwrap();
    assert_eq!(remotes.len(), 1);
    assert_eq!(text(&remotes[0], 1), "origin");
    assert_eq!(text(&remotes[0], 3), "https://example.com/project.git");

    let chain = RemoteRefsIter::from_parent(AllRemotesIter::default());
    let rows = drain(&chain, &ctx, &repo).unwrap();
    assert_eq!(rows.len(), 1);
    let name_idx = remotes_schema().len() + 1;
    assert_eq!(text(&rows[0], name_idx), "refs/remotes/origin/master");
    assert_eq!(text(&rows[0], name_idx + 1), s.origin().to_string());
}

#[test]
fn test_repo_remotes_carry_parent_row() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let rows = drain(&RepoRemotesIter::from_parent(AllReposIter::default()), &ctx, &repo).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], 0), "repo");
    assert_eq!(text(&rows[0], 2), "origin");
}

#[test]
fn test_virtual_head_commit_filters_on_commit_columns() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let template = RefHeadCommitsIter::from_parent(AllRefsIter::default()).as_virtual();
    let cond = filter("commit_message = 'commit 6'", &template.filter_schema());
    let chain = template.with_filter(cond);

    assert_eq!(chain.schema(), refs_schema());
    let rows = drain(&chain, &ctx, &repo).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), refs_schema().len());
    assert_eq!(text(&rows[0], 1), "refs/remotes/origin/master");
}

#[test]
fn test_virtual_root_contributes_nothing() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let refs = AllRefsIter::default()
        .as_virtual()
        .with_filter(filter("ref_name = 'HEAD'", &refs_schema()));
    assert!(refs.schema().is_empty());

    let chain = RefHeadCommitsIter::from_parent(refs);
    assert_eq!(chain.schema(), commits_schema());
    let rows = drain(&chain, &ctx, &repo).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], 1), s.head().to_string());
}

#[test]
fn test_object_enumerations() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let commits = drain(&AllCommitsIter::default(), &ctx, &repo).unwrap();
    assert_eq!(commits.len(), 9);
    let repo_commits = drain(&RepoCommitsIter::from_parent(AllReposIter::default()), &ctx, &repo).unwrap();
    assert_eq!(repo_commits.len(), 9);
    assert_eq!(repo_commits[0][1..], commits[0][..]);

    // 9 readmes, 1 license, 3 lib.rs, 3 util/mod.rs, 1 guide
    let blobs = drain(&AllBlobsIter::default(), &ctx, &repo).unwrap();
    assert_eq!(blobs.len(), 17);
    assert!(blobs.iter().all(|r| r[3] == Value::Blob(Vec::new())));
    let repo_blobs = drain(&RepoBlobsIter::from_parent(AllReposIter::default()), &ctx, &repo).unwrap();
    assert_eq!(repo_blobs.len(), 17);

    let entries = drain(&AllTreeEntriesIter::default(), &ctx, &repo).unwrap();
    let repo_entries = drain(&RepoTreeEntriesIter::from_parent(AllReposIter::default()), &ctx, &repo).unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries.len(), repo_entries.len());
}

#[test]
fn test_commit_tree_walks() {
    let s = scenario();
    let (ctx, repo) = context(&s);
    let head = || {
        RefHeadCommitsIter::from_parent(
            AllRefsIter::default()
                .as_virtual()
                .with_filter(filter("ref_name = 'HEAD'", &refs_schema())),
        )
    };

    // LICENSE README.md docs src, docs/guide.md, src/lib.rs src/util, src/util/mod.rs
    let entries = drain(&CommitTreeEntriesIter::from_parent(head()), &ctx, &repo).unwrap();
    assert_eq!(entries.len(), 8);

    let main = drain(&CommitMainTreeEntriesIter::from_parent(head()), &ctx, &repo).unwrap();
    let name_idx = commits_schema().len() + 1;
    let names: Vec<String> = main.iter().map(|r| text(r, name_idx)).collect();
    assert_eq!(names, vec!["LICENSE", "README.md", "docs", "src"]);

    let files = drain(&CommitFilesIter::from_parent(head()), &ctx, &repo).unwrap();
    let path_idx = commits_schema().len() + 2;
    let paths: Vec<String> = files.iter().map(|r| text(r, path_idx)).collect();
    assert_eq!(
        paths,
        vec!["LICENSE", "README.md", "docs/guide.md", "src/lib.rs", "src/util/mod.rs"]
    );
    let root = s.repo.find_commit(s.head()).unwrap().tree_id().to_string();
    assert!(files.iter().all(|r| text(r, path_idx + 2) == root));

    // root, docs, src, src/util
    let trees = drain(&CommitTreesIter::from_parent(head()), &ctx, &repo).unwrap();
    assert_eq!(trees.len(), 4);
    assert_eq!(text(&trees[0], commits_schema().len() + 2), root);

    let blobs = drain(&CommitBlobsIter::from_parent(head()), &ctx, &repo).unwrap();
    assert_eq!(blobs.len(), 5);
}

#[test]
fn test_shared_subtree_dedup() {
    let (dir, git) = init_repo();
    commit_files(&git, &[("x/f", b"same"), ("y/f", b"same")], "twins", &[]);
    let session = session_with(&[("repo", dir.path())]);
    let repo = session.pool().get("repo").unwrap();
    let ctx = Context::new(session);

    let entries = drain(&CommitTreeEntriesIter::from_parent(AllCommitsIter::default()), &ctx, &repo).unwrap();
    assert_eq!(entries.len(), 3);

    let trees = drain(&CommitTreesIter::from_parent(AllCommitsIter::default()), &ctx, &repo).unwrap();
    assert_eq!(trees.len(), 2);

    let files = drain(&CommitFilesIter::from_parent(AllCommitsIter::default()), &ctx, &repo).unwrap();
    assert_eq!(files.len(), 2);

    let blobs = drain(&CommitBlobsIter::from_parent(AllCommitsIter::default()), &ctx, &repo).unwrap();
    assert_eq!(blobs.len(), 1);
}

#[test]
fn test_files_and_content() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    // 5 commits with 4 files and 4 commits with 5, every root tree distinct
    let files = drain(&AllFilesIter::default(), &ctx, &repo).unwrap();
    assert_eq!(files.len(), 40);
    assert!(files.iter().all(|r| r[5] == Value::Blob(Vec::new())));

    let cond = filter("file_path = 'LICENSE'", &files_schema());
    let license = drain(
        &AllFilesIter::default().with_content(true).with_filter(cond),
        &ctx,
        &repo,
    )
    .unwrap();
    assert_eq!(license.len(), 9);
    assert_eq!(license[0][5], Value::Blob(b"MIT\n".to_vec()));
    assert_eq!(license[0][6], Value::Int(4));
    assert_eq!(text(&license[0], 4), "100644");

    let head = RefHeadCommitsIter::from_parent(
        AllRefsIter::default()
            .as_virtual()
            .with_filter(filter("ref_name = 'HEAD'", &refs_schema())),
    );
    let chain = TreeEntryBlobsIter::from_parent(CommitMainTreeEntriesIter::from_parent(head)).with_content(true);
    let rows = drain(&chain, &ctx, &repo).unwrap();
    // docs and src are trees
    assert_eq!(rows.len(), 2);
    let content_idx = commits_schema().len() + tree_entries_schema().len() + 3;
    assert_eq!(rows[0][content_idx], Value::Blob(b"MIT\n".to_vec()));
}

#[test]
fn test_deep_chain_rows_match_schema() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let refs_filter = filter(
        "ref_name = 'refs/remotes/origin/master'",
        &repositories_schema().join(&refs_schema()),
    );
    let commits = RefCommitsIter::from_parent(
        RepoRefsIter::from_parent(AllReposIter::default()).with_filter(refs_filter),
    );
    let commits_filter = filter("history_index = 0", &commits.schema());
    let chain = TreeEntryBlobsIter::from_parent(CommitTreeEntriesIter::from_parent(
        commits.with_filter(commits_filter),
    ));

    let expected_width = repositories_schema().len()
        + refs_schema().len()
        + ref_commits_schema().len()
        + commits_schema().len()
        + tree_entries_schema().len()
        + blobs_schema().len();
    assert_eq!(chain.schema().len(), expected_width);

    let rows = drain(&chain, &ctx, &repo).unwrap();
    // commit 6: LICENSE README.md docs/guide.md src/lib.rs src/util/mod.rs
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.len() == expected_width));
}

#[test]
fn test_unbound_template_fails() {
    let mut template = AllReposIter::default();
    assert!(matches!(template.advance(), Err(ExecuteError::InvalidContext(_))));
}

#[test]
fn test_canceled_context() {
    let s = scenario();
    let (ctx, repo) = context(&s);

    let mut iter = AllCommitsIter::default().new(&ctx, &repo).unwrap();
    assert!(iter.advance().unwrap());
    ctx.cancel();
    assert!(matches!(iter.advance(), Err(ExecuteError::Canceled)));

    let chain = RefCommitsIter::from_parent(RepoRefsIter::from_parent(AllReposIter::default()));
    let err = drain(&chain, &ctx, &repo).unwrap_err();
    assert!(err.is_canceled());
}

#[test]
fn test_skip_git_errors_on_truncated_pack() {
    let (dir, _git) = truncated_pack_repo();
    let mut pool = RepositoryPool::new();
    pool.add_git("broken", dir.path()).unwrap();
    let pool = Arc::new(pool);
    let repo = pool.get("broken").unwrap();

    let strict = Context::new(Arc::new(Session::new(pool.clone())));
    let err = drain(&AllCommitsIter::default(), &strict, &repo).unwrap_err();
    assert!(err.is_skippable());

    let lenient = Context::new(Arc::new(Session::new(pool).with_skip_git_errors(true)));
    let rows = drain(&AllCommitsIter::default(), &lenient, &repo).unwrap();
    assert!(rows.len() < 2);
}
