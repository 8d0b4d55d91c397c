//! Tree entry, commit tree and file levels.

use std::collections::HashSet;

use git2::Oid;

use super::blobs::load_blob;
use super::{
    passes, unbound, Binding, ChainableIter, CommitsIter, ObjectCursor, ReposIter, RowBuilder, TreeEntriesIter,
    TreeWalker, WalkItem,
};
use crate::catalog::{
    commit_files_schema, commit_trees_schema, files_schema, tree_entries_schema, Row, Schema, Value,
};
use crate::executor::ExecuteResult;
use crate::session::Context;
use crate::sql::Expr;
use crate::storage::{ObjectKind, Repository, StorageResult, TreeEntryInfo};

/// Entries of a single tree.
#[derive(Debug)]
struct TreeCursor {
    tree: Oid,
    entries: Vec<TreeEntryInfo>,
    pos: usize,
}

impl TreeCursor {
    fn load(repo: &Repository, tree: Oid) -> StorageResult<Self> {
        Ok(Self {
            tree,
            entries: repo.tree_entries(tree)?,
            pos: 0,
        })
    }

    fn next(&mut self) -> Option<&TreeEntryInfo> {
        let entry = self.entries.get(self.pos)?;
        self.pos += 1;
        Some(entry)
    }

    fn current(&self) -> Option<&TreeEntryInfo> {
        self.position().and_then(|i| self.entries.get(i))
    }

    fn position(&self) -> Option<usize> {
        self.pos.checked_sub(1)
    }
}

/// Entries of every tree object of a repository.
#[derive(Debug, Default)]
struct ObjectTrees {
    ids: ObjectCursor,
    tree: Option<TreeCursor>,
}

impl ObjectTrees {
    fn load(bound: &Binding, repo: &Repository) -> ExecuteResult<Option<Self>> {
        match ObjectCursor::load(repo, ObjectKind::Tree) {
            Ok(ids) => Ok(Some(Self { ids, tree: None })),
            Err(e) => {
                bound.skip(e, "trees of repository")?;
                Ok(None)
            }
        }
    }

    /// Move to the next entry, crossing into the next tree when the current
    /// one is exhausted.
    fn next(&mut self, bound: &Binding) -> ExecuteResult<bool> {
        loop {
            bound.check()?;
            if let Some(tree) = self.tree.as_mut() {
                if tree.next().is_some() {
                    return Ok(true);
                }
            }
            let Some(oid) = self.ids.next() else {
                self.tree = None;
                return Ok(false);
            };
            match TreeCursor::load(&bound.repo, oid) {
                Ok(tree) => self.tree = Some(tree),
                Err(e) => {
                    self.tree = None;
                    bound.skip(e, "tree")?;
                }
            }
        }
    }

    fn current(&self) -> Option<(Oid, &TreeEntryInfo)> {
        let tree = self.tree.as_ref()?;
        Some((tree.tree, tree.current()?))
    }

    fn position(&self) -> Option<usize> {
        self.tree.as_ref().and_then(TreeCursor::position)
    }
}

fn tree_entry_row(bound: &Binding, parent: &[Value], tree: Oid, entry: &TreeEntryInfo) -> Row {
    let mut b = RowBuilder::with_capacity(parent.len() + tree_entries_schema().len());
    b.extend_from(parent).push_tree_entry(bound.repo_id(), tree, entry);
    b.build()
}

/// Entries of every tree object of the bound repository.
#[derive(Debug, Default)]
pub struct AllTreeEntriesIter {
    filter: Option<Expr>,
    bound: Option<Binding>,
    trees: Option<ObjectTrees>,
    row: Row,
}

impl AllTreeEntriesIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// position of the current entry in its tree
    pub(crate) fn position(&self) -> Option<usize> {
        self.trees.as_ref().and_then(ObjectTrees::position)
    }
}

impl ChainableIter for AllTreeEntriesIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            ..Default::default()
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        if self.trees.is_none() {
            self.trees = Some(ObjectTrees::load(bound, &bound.repo)?.unwrap_or_default());
        }
        let Some(trees) = self.trees.as_mut() else {
            return Ok(false);
        };

        while trees.next(bound)? {
            let Some((tree, entry)) = trees.current() else {
                continue;
            };
            let row = tree_entry_row(bound, &[], tree, entry);
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        tree_entries_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.trees = None;
        self.bound = None;
        Ok(())
    }
}

impl TreeEntriesIter for AllTreeEntriesIter {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.trees.as_ref()?.current().map(|(_, entry)| entry)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.trees.as_ref()?.current().map(|(tree, _)| tree)
    }
}

/// Entries of every tree object of each repository yielded by the parent.
#[derive(Debug)]
pub struct RepoTreeEntriesIter<R> {
    parent: R,
    filter: Option<Expr>,
    bound: Option<Binding>,
    trees: Option<ObjectTrees>,
    row: Row,
}

impl<R: ReposIter> RepoTreeEntriesIter<R> {
    pub fn from_parent(parent: R) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            trees: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub(crate) fn position(&self) -> Option<usize> {
        self.trees.as_ref().and_then(ObjectTrees::position)
    }
}

impl<R: ReposIter> ChainableIter for RepoTreeEntriesIter<R> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            trees: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.trees.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                let Some(repo) = self.parent.repository() else {
                    continue;
                };
                self.trees = ObjectTrees::load(bound, repo)?;
                continue;
            }

            let Some(trees) = self.trees.as_mut() else {
                continue;
            };
            if !trees.next(bound)? {
                self.trees = None;
                continue;
            }
            let Some((tree, entry)) = trees.current() else {
                continue;
            };

            let row = tree_entry_row(bound, self.parent.row(), tree, entry);
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&tree_entries_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.trees = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<R: ReposIter> TreeEntriesIter for RepoTreeEntriesIter<R> {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.trees.as_ref()?.current().map(|(_, entry)| entry)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.trees.as_ref()?.current().map(|(tree, _)| tree)
    }
}

/// Entries of the root tree of each commit yielded by the parent.
#[derive(Debug)]
pub struct CommitMainTreeEntriesIter<C> {
    parent: C,
    filter: Option<Expr>,
    virtual_level: bool,
    bound: Option<Binding>,
    tree: Option<TreeCursor>,
    row: Row,
}

impl<C: CommitsIter> CommitMainTreeEntriesIter<C> {
    pub fn from_parent(parent: C) -> Self {
        Self {
            parent,
            filter: None,
            virtual_level: false,
            bound: None,
            tree: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Contribute no columns to the row.
    pub fn as_virtual(mut self) -> Self {
        self.virtual_level = true;
        self
    }

    pub(crate) fn position(&self) -> Option<usize> {
        self.tree.as_ref().and_then(TreeCursor::position)
    }
}

impl<C: CommitsIter> ChainableIter for CommitMainTreeEntriesIter<C> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            virtual_level: self.virtual_level,
            bound: Some(Binding::new(ctx, repo)),
            tree: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.tree.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                let Some(commit) = self.parent.commit() else {
                    continue;
                };
                match TreeCursor::load(&bound.repo, commit.tree_id.raw()) {
                    Ok(tree) => self.tree = Some(tree),
                    Err(e) => bound.skip(e, "root tree of commit")?,
                }
                continue;
            }

            let Some(tree) = self.tree.as_mut() else {
                continue;
            };
            let tree_id = tree.tree;
            let Some(entry) = tree.next() else {
                self.tree = None;
                continue;
            };

            let parent_row = self.parent.row();
            let full = tree_entry_row(bound, parent_row, tree_id, entry);
            if !passes(self.filter.as_ref(), &full)? {
                continue;
            }
            self.row = if self.virtual_level {
                parent_row.to_vec()
            } else {
                full
            };
            return Ok(true);
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        if self.virtual_level {
            return self.parent.schema();
        }
        self.filter_schema()
    }

    fn filter_schema(&self) -> Schema {
        self.parent.schema().join(&tree_entries_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.tree = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<C: CommitsIter> TreeEntriesIter for CommitMainTreeEntriesIter<C> {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.tree.as_ref().and_then(TreeCursor::current)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.tree.as_ref().map(|t| t.tree)
    }
}

/// Walk state shared by the levels that traverse a commit's whole tree.
#[derive(Debug)]
struct CommitWalk {
    commit: Oid,
    root: Oid,
    walker: TreeWalker,
    item: Option<WalkItem>,
}

impl CommitWalk {
    fn start(commit: Oid, root: Oid, dedup: bool) -> Self {
        let mut walker = TreeWalker::new(dedup);
        walker.reset(root);
        Self {
            commit,
            root,
            walker,
            item: None,
        }
    }

    /// Next item of the walk. Ok(false) once the walk is done. A tree that
    /// fails to load is skipped when the session allows it.
    fn next(&mut self, bound: &Binding) -> ExecuteResult<bool> {
        loop {
            bound.check()?;
            match self.walker.next(&bound.repo) {
                Ok(Some(item)) => {
                    self.item = Some(item);
                    return Ok(true);
                }
                Ok(None) => {
                    self.item = None;
                    return Ok(false);
                }
                Err(e) => bound.skip(e, "tree of commit")?,
            }
        }
    }
}

/// Start a walk for the parent's current commit.
fn start_walk<C: CommitsIter>(parent: &C, dedup: bool) -> Option<CommitWalk> {
    parent
        .commit()
        .map(|c| CommitWalk::start(c.id.raw(), c.tree_id.raw(), dedup))
}

/// Entries of every tree reachable from each commit yielded by the parent.
/// A subtree shared by several paths is only walked once per commit.
#[derive(Debug)]
pub struct CommitTreeEntriesIter<C> {
    parent: C,
    filter: Option<Expr>,
    virtual_level: bool,
    bound: Option<Binding>,
    walk: Option<CommitWalk>,
    row: Row,
}

impl<C: CommitsIter> CommitTreeEntriesIter<C> {
    pub fn from_parent(parent: C) -> Self {
        Self {
            parent,
            filter: None,
            virtual_level: false,
            bound: None,
            walk: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Contribute no columns to the row.
    pub fn as_virtual(mut self) -> Self {
        self.virtual_level = true;
        self
    }

    pub(crate) fn position(&self) -> Option<usize> {
        self.walk.as_ref()?.item.as_ref().map(|item| item.pos)
    }
}

impl<C: CommitsIter> ChainableIter for CommitTreeEntriesIter<C> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            virtual_level: self.virtual_level,
            bound: Some(Binding::new(ctx, repo)),
            walk: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.walk.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                self.walk = start_walk(&self.parent, true);
                continue;
            }

            let Some(walk) = self.walk.as_mut() else {
                continue;
            };
            if !walk.next(bound)? {
                self.walk = None;
                continue;
            }
            let Some(item) = walk.item.as_ref() else {
                continue;
            };

            let parent_row = self.parent.row();
            let full = tree_entry_row(bound, parent_row, item.tree, &item.entry);
            if !passes(self.filter.as_ref(), &full)? {
                continue;
            }
            self.row = if self.virtual_level {
                parent_row.to_vec()
            } else {
                full
            };
            return Ok(true);
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        if self.virtual_level {
            return self.parent.schema();
        }
        self.filter_schema()
    }

    fn filter_schema(&self) -> Schema {
        self.parent.schema().join(&tree_entries_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.walk = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<C: CommitsIter> TreeEntriesIter for CommitTreeEntriesIter<C> {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.walk.as_ref()?.item.as_ref().map(|item| &item.entry)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.walk.as_ref()?.item.as_ref().map(|item| item.tree)
    }
}

/// The root tree and every subtree reachable from each commit yielded by
/// the parent, one row per distinct tree.
#[derive(Debug)]
pub struct CommitTreesIter<C> {
    parent: C,
    filter: Option<Expr>,
    bound: Option<Binding>,
    walk: Option<CommitWalk>,
    root_pending: bool,
    row: Row,
}

impl<C: CommitsIter> CommitTreesIter<C> {
    pub fn from_parent(parent: C) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            walk: None,
            root_pending: false,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<C: CommitsIter> ChainableIter for CommitTreesIter<C> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            walk: None,
            root_pending: false,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.walk.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                self.walk = start_walk(&self.parent, true);
                self.root_pending = true;
                continue;
            }

            let Some(walk) = self.walk.as_mut() else {
                continue;
            };
            let tree = if self.root_pending {
                self.root_pending = false;
                walk.root
            } else {
                if !walk.next(bound)? {
                    self.walk = None;
                    continue;
                }
                match walk.item.as_ref() {
                    Some(item) if item.entry.is_tree() && item.first_visit => item.entry.id,
                    _ => continue,
                }
            };

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + commit_trees_schema().len());
            b.extend_from(parent_row)
                .push_commit_tree(bound.repo_id(), walk.commit, tree);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&commit_trees_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.walk = None;
        self.bound = None;
        self.parent.close()
    }
}

/// Every file (blob entry, submodules excluded) reachable from each commit
/// yielded by the parent, with its full path. Shared subtrees are walked
/// under every path they appear at.
#[derive(Debug)]
pub struct CommitFilesIter<C> {
    parent: C,
    filter: Option<Expr>,
    bound: Option<Binding>,
    walk: Option<CommitWalk>,
    row: Row,
}

impl<C: CommitsIter> CommitFilesIter<C> {
    pub fn from_parent(parent: C) -> Self {
        Self {
            parent,
            filter: None,
            bound: None,
            walk: None,
            row: Row::new(),
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// current file with the commit and root tree it was reached from
    pub(crate) fn current_file(&self) -> Option<(&WalkItem, Oid, Oid)> {
        let walk = self.walk.as_ref()?;
        Some((walk.item.as_ref()?, walk.commit, walk.root))
    }
}

impl<C: CommitsIter> ChainableIter for CommitFilesIter<C> {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            parent: self.parent.new(ctx, repo)?,
            filter: self.filter.clone(),
            bound: Some(Binding::new(ctx, repo)),
            walk: None,
            row: Row::new(),
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.as_ref().ok_or_else(unbound)?;
        loop {
            bound.check()?;

            if self.walk.is_none() {
                if !self.parent.advance()? {
                    return Ok(false);
                }
                self.walk = start_walk(&self.parent, false);
                continue;
            }

            let Some(walk) = self.walk.as_mut() else {
                continue;
            };
            if !walk.next(bound)? {
                self.walk = None;
                continue;
            }
            let Some(item) = walk.item.as_ref() else {
                continue;
            };
            if item.entry.is_tree() || item.entry.is_submodule() {
                continue;
            }

            let parent_row = self.parent.row();
            let mut b = RowBuilder::with_capacity(parent_row.len() + commit_files_schema().len());
            b.extend_from(parent_row)
                .push_commit_file(bound.repo_id(), walk.commit, &item.path, item.entry.id, walk.root);
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        self.parent.schema().join(&commit_files_schema())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.walk = None;
        self.bound = None;
        self.parent.close()
    }
}

impl<C: CommitsIter> TreeEntriesIter for CommitFilesIter<C> {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.walk.as_ref()?.item.as_ref().map(|item| &item.entry)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.walk.as_ref()?.item.as_ref().map(|item| item.tree)
    }
}

/// Every file of every distinct root tree in the bound repository. Root
/// trees shared by several commits are read once.
#[derive(Debug, Default)]
pub struct AllFilesIter {
    filter: Option<Expr>,
    read_content: bool,
    bound: Option<Binding>,
    commits: Option<ObjectCursor>,
    seen: HashSet<Oid>,
    walk: Option<CommitWalk>,
    row: Row,
}

impl AllFilesIter {
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Load blob content into `blob_content`.
    pub fn with_content(mut self, read_content: bool) -> Self {
        self.read_content = read_content;
        self
    }

    /// current file with the root tree it was reached from
    pub(crate) fn current_file(&self) -> Option<(&WalkItem, Oid)> {
        let walk = self.walk.as_ref()?;
        Some((walk.item.as_ref()?, walk.root))
    }

    /// Walk of the next root tree not seen yet.
    fn next_walk(&mut self, bound: &Binding) -> ExecuteResult<Option<CommitWalk>> {
        let Some(commits) = self.commits.as_mut() else {
            return Ok(None);
        };
        loop {
            bound.check()?;
            let Some(oid) = commits.next() else {
                return Ok(None);
            };
            let commit = match bound.repo.find_commit(oid) {
                Ok(commit) => commit,
                Err(e) => {
                    bound.skip(e, "commit")?;
                    continue;
                }
            };
            let root = commit.tree_id.raw();
            if self.seen.insert(root) {
                return Ok(Some(CommitWalk::start(oid, root, false)));
            }
        }
    }
}

impl ChainableIter for AllFilesIter {
    fn new(&self, ctx: &Context, repo: &Repository) -> ExecuteResult<Self> {
        Ok(Self {
            filter: self.filter.clone(),
            read_content: self.read_content,
            bound: Some(Binding::new(ctx, repo)),
            ..Default::default()
        })
    }

    fn advance(&mut self) -> ExecuteResult<bool> {
        let bound = self.bound.clone().ok_or_else(unbound)?;
        if self.commits.is_none() {
            self.commits = match ObjectCursor::load(&bound.repo, ObjectKind::Commit) {
                Ok(ids) => Some(ids),
                Err(e) => {
                    bound.skip(e, "commits of repository")?;
                    Some(ObjectCursor::default())
                }
            };
        }

        loop {
            bound.check()?;

            if self.walk.is_none() {
                match self.next_walk(&bound)? {
                    Some(walk) => self.walk = Some(walk),
                    None => return Ok(false),
                }
            }

            let Some(walk) = self.walk.as_mut() else {
                continue;
            };
            if !walk.next(&bound)? {
                self.walk = None;
                continue;
            }
            let Some(item) = walk.item.as_ref() else {
                continue;
            };
            if item.entry.is_tree() || item.entry.is_submodule() {
                continue;
            }

            let cfg = bound.ctx.session().blobs();
            let (size, content) = match load_blob(&bound.repo, item.entry.id, self.read_content, cfg) {
                Ok(blob) => blob,
                Err(e) => {
                    bound.skip(e, "blob of file")?;
                    continue;
                }
            };

            let mut b = RowBuilder::with_capacity(files_schema().len());
            b.push_file(
                bound.repo_id(),
                &item.path,
                item.entry.id,
                walk.root,
                item.entry.mode,
                content,
                size,
                self.read_content,
                cfg,
            );
            let row = b.build();
            if passes(self.filter.as_ref(), &row)? {
                self.row = row;
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> Schema {
        files_schema()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.commits = None;
        self.walk = None;
        self.seen.clear();
        self.bound = None;
        Ok(())
    }
}

impl TreeEntriesIter for AllFilesIter {
    fn tree_entry(&self) -> Option<&TreeEntryInfo> {
        self.walk.as_ref()?.item.as_ref().map(|item| &item.entry)
    }

    fn tree_id(&self) -> Option<Oid> {
        self.walk.as_ref()?.item.as_ref().map(|item| item.tree)
    }
}
