//! In-process index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::build::{Indexable, KeyValueIter};
use super::error::IndexResult;
use super::read::IndexValueIter;
use crate::catalog::Value;
use crate::executor::{values_equal, ExecuteResult};

/// `(values, key)` pairs kept in memory, looked up by equality on every
/// indexed column.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    columns: Vec<String>,
    entries: Vec<(Vec<Value>, Vec<u8>)>,
}

impl MemoryIndex {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            entries: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, values: Vec<Value>, key: Vec<u8>) {
        self.entries.push((values, key));
    }

    /// Drain `iter` into the index and close it. Returns how many entries
    /// were added.
    pub fn build<I: Indexable>(&mut self, iter: &mut KeyValueIter<I>) -> ExecuteResult<usize> {
        let mut added = 0;
        loop {
            match iter.next_entry() {
                Ok(Some((values, key))) => {
                    self.insert(values, key);
                    added += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = iter.close();
                    return Err(e);
                }
            }
        }
        iter.close()?;
        tracing::debug!(entries = added, columns = ?self.columns, "built memory index");
        Ok(added)
    }

    /// Keys whose values equal `values`, in insertion order.
    pub fn lookup(&self, values: &[Value]) -> MemoryValueIter {
        let keys = self
            .entries
            .iter()
            .filter(|(v, _)| v.len() == values.len() && v.iter().zip(values).all(|(a, b)| values_equal(a, b)))
            .map(|(_, key)| key.clone())
            .collect();
        MemoryValueIter::new(keys)
    }

    /// Every key, in insertion order.
    pub fn all(&self) -> MemoryValueIter {
        MemoryValueIter::new(self.entries.iter().map(|(_, key)| key.clone()).collect())
    }
}

/// Keys of a [`MemoryIndex`] lookup.
#[derive(Debug)]
pub struct MemoryValueIter {
    keys: std::vec::IntoIter<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl MemoryValueIter {
    fn new(keys: Vec<Vec<u8>>) -> Self {
        Self {
            keys: keys.into_iter(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag raised once the iterator is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Append a raw value, e.g. one that is not a valid key.
    pub fn push_raw(self, value: Vec<u8>) -> Self {
        let mut keys: Vec<Vec<u8>> = self.keys.collect();
        keys.push(value);
        Self {
            keys: keys.into_iter(),
            closed: self.closed,
        }
    }
}

impl IndexValueIter for MemoryValueIter {
    fn next_value(&mut self) -> IndexResult<Option<Vec<u8>>> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(self.keys.next())
    }

    fn close(&mut self) -> IndexResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_values() {
        let mut index = MemoryIndex::new(&["ref_name"]);
        index.insert(vec![Value::from("HEAD")], vec![1]);
        index.insert(vec![Value::from("refs/heads/master")], vec![2]);
        index.insert(vec![Value::from("HEAD")], vec![3]);

        let mut iter = index.lookup(&[Value::from("HEAD")]);
        assert_eq!(iter.next_value().unwrap(), Some(vec![1]));
        assert_eq!(iter.next_value().unwrap(), Some(vec![3]));
        assert_eq!(iter.next_value().unwrap(), None);

        assert_eq!(index.all().keys.len(), 3);
        assert!(index.lookup(&[Value::from("nope")]).keys.as_slice().is_empty());
    }

    #[test]
    fn test_close_stops_iteration() {
        let mut index = MemoryIndex::new(&["n"]);
        index.insert(vec![Value::Int(1)], vec![1]);
        index.insert(vec![Value::Int(1)], vec![2]);

        let mut iter = index.lookup(&[Value::Int(1)]);
        let closed = iter.closed_flag();
        assert!(iter.next_value().unwrap().is_some());
        iter.close().unwrap();
        assert!(closed.load(Ordering::Acquire));
        assert_eq!(iter.next_value().unwrap(), None);
    }
}
