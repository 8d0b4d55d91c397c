//! Row iteration and filter evaluation.
//!
//! Uses the Volcano/Iterator model where each iterator produces rows one at
//! a time.

mod error;
mod eval;
mod operators;

pub use error::{ExecuteError, ExecuteResult};
pub use eval::{evaluate, like_match, matches_where, values_equal};
pub use operators::{collect_rows, FilterIter, ProjectIter, RowIter, VecRowIter};
