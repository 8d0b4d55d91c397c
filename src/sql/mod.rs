//! Filter expressions for gitsquash cursors.
//!
//! Uses `sqlparser` to read `WHERE`-style text, then converts it to our
//! internal AST with columns resolved to row positions.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::Parser;
