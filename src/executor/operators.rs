//! Volcano-style row iterators.
//!
//! Every cursor the crate hands out is a [`RowIter`]: rows are pulled one
//! at a time, and `close` releases whatever the iterator holds. Filters and
//! projections left over after pushdown wrap another iterator.

use super::error::ExecuteResult;
use super::eval::matches_where;
use crate::catalog::Row;
use crate::sql::Expr;

/// Pull-based row stream.
pub trait RowIter: Send {
    /// Get the next row, or None if exhausted.
    fn next_row(&mut self) -> ExecuteResult<Option<Row>>;

    /// Release resources. Calling it more than once is harmless.
    fn close(&mut self) -> ExecuteResult<()>;
}

impl RowIter for Box<dyn RowIter> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        (**self).next_row()
    }

    fn close(&mut self) -> ExecuteResult<()> {
        (**self).close()
    }
}

/// Rows that are already materialized.
pub struct VecRowIter {
    rows: std::vec::IntoIter<Row>,
}

impl VecRowIter {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl RowIter for VecRowIter {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> ExecuteResult<()> {
        Ok(())
    }
}

/// Keeps rows matching a predicate.
pub struct FilterIter<I> {
    source: I,
    predicate: Expr,
}

impl<I: RowIter> FilterIter<I> {
    pub fn new(source: I, predicate: Expr) -> Self {
        Self { source, predicate }
    }
}

impl<I: RowIter> RowIter for FilterIter<I> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        while let Some(row) = self.source.next_row()? {
            if matches_where(&self.predicate, &row)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.source.close()
    }
}

/// Keeps only the columns at the given positions, in that order.
pub struct ProjectIter<I> {
    source: I,
    indices: Vec<usize>,
}

impl<I: RowIter> ProjectIter<I> {
    pub fn new(source: I, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }
}

impl<I: RowIter> RowIter for ProjectIter<I> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        let Some(row) = self.source.next_row()? else {
            return Ok(None);
        };
        let mut projected = Vec::with_capacity(self.indices.len());
        for &idx in &self.indices {
            let value = row.get(idx).cloned().ok_or_else(|| {
                super::ExecuteError::ColumnNotFound(format!("#{} (row has {} columns)", idx, row.len()))
            })?;
            projected.push(value);
        }
        Ok(Some(projected))
    }

    fn close(&mut self) -> ExecuteResult<()> {
        self.source.close()
    }
}

/// Drain an iterator into a vector and close it, also on error.
pub fn collect_rows<I: RowIter>(mut iter: I) -> ExecuteResult<Vec<Row>> {
    let mut rows = Vec::new();
    loop {
        match iter.next_row() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break,
            Err(e) => {
                let _ = iter.close();
                return Err(e);
            }
        }
    }
    iter.close()?;
    Ok(rows)
}
