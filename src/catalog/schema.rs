//! Cursor schemas and the layouts of the git tables.

use serde::{Deserialize, Serialize};

use super::types::{Column, DataType};

pub const REPOSITORIES_TABLE: &str = "repositories";
pub const REMOTES_TABLE: &str = "remotes";
pub const REFS_TABLE: &str = "refs";
pub const COMMITS_TABLE: &str = "commits";
pub const REF_COMMITS_TABLE: &str = "ref_commits";
pub const TREE_ENTRIES_TABLE: &str = "tree_entries";
pub const BLOBS_TABLE: &str = "blobs";
pub const COMMIT_TREES_TABLE: &str = "commit_trees";
pub const COMMIT_BLOBS_TABLE: &str = "commit_blobs";
pub const COMMIT_FILES_TABLE: &str = "commit_files";
pub const FILES_TABLE: &str = "files";

/// Every table name, in catalog order.
pub const TABLE_NAMES: &[&str] = &[
    REPOSITORIES_TABLE,
    REMOTES_TABLE,
    REFS_TABLE,
    COMMITS_TABLE,
    REF_COMMITS_TABLE,
    TREE_ENTRIES_TABLE,
    BLOBS_TABLE,
    COMMIT_TREES_TABLE,
    COMMIT_BLOBS_TABLE,
    COMMIT_FILES_TABLE,
    FILES_TABLE,
];

/// Ordered column list of a cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Position of the first column named `name`. A `table.column` name
    /// also checks the source table.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        match name.split_once('.') {
            Some((table, column)) => self
                .columns
                .iter()
                .position(|c| c.source.eq_ignore_ascii_case(table) && c.name.eq_ignore_ascii_case(column)),
            None => self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// This schema followed by `other`.
    pub fn join(&self, other: &Schema) -> Schema {
        let mut columns = Vec::with_capacity(self.len() + other.len());
        columns.extend_from_slice(&self.columns);
        columns.extend_from_slice(&other.columns);
        Schema { columns }
    }

    /// Keep only the columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices.iter().filter_map(|&i| self.columns.get(i).cloned()).collect(),
        }
    }
}

fn text(name: &str, table: &str) -> Column {
    Column::new(name, table, DataType::Text)
}

pub fn repositories_schema() -> Schema {
    Schema::new(vec![text("repository_id", REPOSITORIES_TABLE)])
}

pub fn remotes_schema() -> Schema {
    let t = REMOTES_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("remote_name", t),
        text("remote_push_url", t).nullable(),
        text("remote_fetch_url", t).nullable(),
        text("remote_push_refspec", t).nullable(),
        text("remote_fetch_refspec", t).nullable(),
    ])
}

pub fn refs_schema() -> Schema {
    let t = REFS_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("ref_name", t),
        text("commit_hash", t),
    ])
}

pub fn commits_schema() -> Schema {
    let t = COMMITS_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("commit_hash", t),
        text("commit_author_name", t),
        text("commit_author_email", t),
        Column::new("commit_author_when", t, DataType::Timestamp),
        text("committer_name", t),
        text("committer_email", t),
        Column::new("committer_when", t, DataType::Timestamp),
        text("commit_message", t),
        text("tree_hash", t),
        Column::new("commit_parents", t, DataType::Array(Box::new(DataType::Text))),
    ])
}

pub fn ref_commits_schema() -> Schema {
    let t = REF_COMMITS_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("commit_hash", t),
        text("ref_name", t),
        Column::new("history_index", t, DataType::Integer),
    ])
}

pub fn tree_entries_schema() -> Schema {
    let t = TREE_ENTRIES_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("tree_entry_name", t),
        text("blob_hash", t),
        text("tree_hash", t),
        text("tree_entry_mode", t),
    ])
}

pub fn blobs_schema() -> Schema {
    let t = BLOBS_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("blob_hash", t),
        Column::new("blob_size", t, DataType::Integer),
        Column::new("blob_content", t, DataType::Blob),
    ])
}

pub fn commit_trees_schema() -> Schema {
    let t = COMMIT_TREES_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("commit_hash", t),
        text("tree_hash", t),
    ])
}

pub fn commit_blobs_schema() -> Schema {
    let t = COMMIT_BLOBS_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("commit_hash", t),
        text("blob_hash", t),
    ])
}

pub fn commit_files_schema() -> Schema {
    let t = COMMIT_FILES_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("commit_hash", t),
        text("file_path", t),
        text("blob_hash", t),
        text("tree_hash", t),
    ])
}

pub fn files_schema() -> Schema {
    let t = FILES_TABLE;
    Schema::new(vec![
        text("repository_id", t),
        text("file_path", t),
        text("blob_hash", t),
        text("tree_hash", t),
        text("tree_entry_mode", t),
        Column::new("blob_content", t, DataType::Blob),
        Column::new("blob_size", t, DataType::Integer),
    ])
}

/// Schema of a table by name.
pub fn table_schema(name: &str) -> Option<Schema> {
    let schema = match name {
        REPOSITORIES_TABLE => repositories_schema(),
        REMOTES_TABLE => remotes_schema(),
        REFS_TABLE => refs_schema(),
        COMMITS_TABLE => commits_schema(),
        REF_COMMITS_TABLE => ref_commits_schema(),
        TREE_ENTRIES_TABLE => tree_entries_schema(),
        BLOBS_TABLE => blobs_schema(),
        COMMIT_TREES_TABLE => commit_trees_schema(),
        COMMIT_BLOBS_TABLE => commit_blobs_schema(),
        COMMIT_FILES_TABLE => commit_files_schema(),
        FILES_TABLE => files_schema(),
        _ => return None,
    };
    Some(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_a_schema() {
        for name in TABLE_NAMES {
            let schema = table_schema(name).unwrap();
            assert_eq!(schema.column(0).unwrap().name, "repository_id");
            assert!(schema.columns().iter().all(|c| c.source == *name));
        }
        assert!(table_schema("nope").is_none());
    }

    #[test]
    fn test_index_of_qualified() {
        let schema = refs_schema().join(&commits_schema());
        assert_eq!(schema.index_of("ref_name"), Some(1));
        assert_eq!(schema.index_of("commit_hash"), Some(2));
        assert_eq!(schema.index_of("commits.commit_hash"), Some(4));
        assert_eq!(schema.index_of("COMMITS.Commit_Hash"), Some(4));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn test_project() {
        let schema = blobs_schema().project(&[1, 2]);
        assert_eq!(schema.column_names(), vec!["blob_hash", "blob_size"]);
    }
}
