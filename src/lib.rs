//! gitsquash - git repositories as streams of SQL rows
//!
//! A join over the git tables (repositories, refs, commits, tree entries,
//! blobs, ...) runs as a single squashed traversal per repository, can be
//! served from a secondary index that decodes rows straight out of
//! packfiles, and can fan out over a pool of repositories.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gitsquash::executor::collect_rows;
//! use gitsquash::session::{Context, Session};
//! use gitsquash::storage::RepositoryPool;
//! use gitsquash::tables::Table;
//!
//! let mut pool = RepositoryPool::new();
//! pool.add_git("gitsquash", ".").unwrap();
//! let ctx = Context::new(Arc::new(Session::new(Arc::new(pool))));
//!
//! let table = Table::open("ref_commits", Some("ref_name = 'HEAD'")).unwrap();
//! for row in collect_rows(table.rows(&ctx)).unwrap() {
//!     println!("{:?}", row);
//! }
//! ```

#![allow(dead_code)]

pub mod catalog;
pub mod config;
pub mod executor;
pub mod index;
pub mod partition;
pub mod session;
pub mod sql;
pub mod squash;
pub mod storage;
pub mod tables;

#[cfg(test)]
mod test_support;
