//! Secondary indexes over squashed cursors.
//!
//! Building an index drives a cursor and records, per row, the values of
//! the indexed columns next to a compact key that locates the row's
//! objects. Reading one turns the keys of a lookup back into rows by
//! decoding those objects directly from their packfiles.
//!
//! ```text
//!   build:  cursor ─▶ KeyValueIter ─▶ (values, key) ─▶ MemoryIndex
//!   read:   lookup ─▶ IndexValueIter ─▶ IndexRowIter ─(KeyRowMapper, ObjectDecoder)─▶ rows
//! ```

mod build;
mod error;
mod key;
mod memory;
mod read;


pub use build::{row_index_values, Indexable, KeyValueIter};
pub use error::{IndexError, IndexResult};
pub use key::{
    compress, decompress, FileKey, IndexKey, KeyReader, KeyWriter, PackOffsetKey, RefCommitKey, RemoteKey,
    TreeEntryKey,
};
pub use memory::{MemoryIndex, MemoryValueIter};
pub use read::{
    BlobsKeyMapper, CommitsKeyMapper, FilesKeyMapper, IndexRowIter, IndexValueIter, KeyRowMapper,
    RefCommitsKeyMapper, RemotesKeyMapper, TreeEntriesKeyMapper,
};
