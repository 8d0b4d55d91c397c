//! Catalog module: row values and the schemas of the git tables.
//!
//! Rows are positional. A cursor's [`Schema`] says which column lives at
//! which position, and filters are resolved against it before execution.

mod schema;
mod types;

pub use schema::*;
pub use types::{Column, DataType, Value};

/// A row is a positional list of values.
pub type Row = Vec<Value>;
