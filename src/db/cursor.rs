//! Restartable result cursor: descriptors are materialised up front,
//! records are fetched lazily while the owning transaction is alive.

use crate::db::transaction::Transaction;
use crate::error::Result;
use crate::model::{RecordDescriptor, RecordResult};

/// Cursor over a query or traversal result. Implements [`Iterator`] for
/// forward walks; `previous`, `first`, `last` and `to` reposition it.
/// Records deleted after the cursor was built are skipped.
pub struct ResultCursor<'t, 'ctx> {
    txn: &'t Transaction<'ctx>,
    descriptors: Vec<RecordDescriptor>,
    position: Option<usize>,
}

impl<'t, 'ctx> ResultCursor<'t, 'ctx> {
    pub(crate) fn new(txn: &'t Transaction<'ctx>, descriptors: Vec<RecordDescriptor>) -> Self {
        Self {
            txn,
            descriptors,
            position: None,
        }
    }

    /// Number of descriptors the cursor was built over.
    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The materialised descriptors, in result order.
    pub fn descriptors(&self) -> &[RecordDescriptor] {
        &self.descriptors
    }

    /// Moves to the first result.
    pub fn first(&mut self) -> Option<Result<RecordResult>> {
        self.position = None;
        self.next()
    }

    /// Moves to the last result.
    pub fn last(&mut self) -> Option<Result<RecordResult>> {
        if self.descriptors.is_empty() {
            return None;
        }
        self.to(self.descriptors.len() - 1)
    }

    /// Moves to the result at `index`.
    pub fn to(&mut self, index: usize) -> Option<Result<RecordResult>> {
        if index >= self.descriptors.len() {
            return None;
        }
        self.position = Some(index);
        self.fetch(index)
    }

    /// Moves one step back; at the first result the cursor returns to its
    /// initial position.
    pub fn previous(&mut self) -> Option<Result<RecordResult>> {
        let current = self.position?;
        if current == 0 {
            self.position = None;
            return None;
        }
        self.position = Some(current - 1);
        self.fetch(current - 1)
    }

    fn fetch(&self, index: usize) -> Option<Result<RecordResult>> {
        let descriptor = self.descriptors[index];
        match self.txn.fetch_result(&descriptor) {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

impl Iterator for ResultCursor<'_, '_> {
    type Item = Result<RecordResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = match self.position {
                None => 0,
                Some(current) => current + 1,
            };
            if next >= self.descriptors.len() {
                return None;
            }
            self.position = Some(next);
            let descriptor = self.descriptors[next];
            match self.txn.fetch_result(&descriptor) {
                Ok(Some(result)) => return Some(Ok(result)),
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
