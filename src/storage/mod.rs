//! storage layer for gitsquash
//!
//! Read-only access to git object stores. Cursors go through
//! [`Repository`] (libgit2 behind a lock) for traversal, while the index
//! read path decodes objects straight out of packfiles with
//! [`ObjectDecoder`] once their location is known.
//!
//! ```text
//!   RepositoryPool ── id ──▶ Repository ──▶ refs / commits / trees / blobs
//!                                │
//!                                ▼
//!                         RepositoryIndex ── (packfile, offset) ──▶ ObjectDecoder
//!                                                                        │
//!                                                                        ▼
//!                                                                    RawObject
//! ```

pub mod blob;
mod commit;
pub mod decoder;
mod errors;
pub mod object;
pub mod packfile;
mod pool;
mod refs;
mod repository;
mod tree;
mod types;

pub use commit::CommitInfo;
pub use decoder::ObjectDecoder;
pub use errors::{StorageError, StorageResult};
pub use object::RawObject;
pub use packfile::{ObjectLocation, RepositoryIndex};
pub use pool::RepositoryPool;
pub use refs::Reference;
pub use repository::Repository;
pub use tree::{parse_tree, TreeEntryInfo};
pub use types::{
    mode_string, BlobId, CommitId, ObjectKind, RefInfo, RemoteInfo, Signature, TreeId, MODE_SUBMODULE,
    MODE_TREE,
};
