//! Atomic multi-table writes.
//!
//! Every accepted header is committed as one batch: the header record, its
//! chain work, any canonical index rewrites and the new chain tip.

use crate::ColumnFamily;

/// What an operation does to its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Put a key-value pair.
    Put { value: Vec<u8> },
    /// Delete a key.
    Delete,
}

/// One queued write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOperation {
    /// Target column family.
    pub cf: ColumnFamily,
    /// Key to operate on.
    pub key: Vec<u8>,
    /// Kind of operation.
    pub kind: OperationKind,
}

/// Writes committed together by [`Storage::write_batch`](crate::Storage::write_batch).
///
/// Operations are applied in insertion order, so a later put or delete of the
/// same key wins.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) operations: Vec<BatchOperation>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation {
            cf,
            key: key.into(),
            kind: OperationKind::Put {
                value: value.into(),
            },
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation {
            cf,
            key: key.into(),
            kind: OperationKind::Delete,
        });
    }

    /// Look up the most recent pending value for a key.
    ///
    /// Returns `Some(None)` when the key is pending deletion and `None` when
    /// the batch does not touch the key at all.
    pub fn pending(&self, cf: ColumnFamily, key: &[u8]) -> Option<Option<&[u8]>> {
        self.operations
            .iter()
            .rev()
            .find(|op| op.cf == cf && op.key == key)
            .map(|op| match &op.kind {
                OperationKind::Put { value } => Some(value.as_slice()),
                OperationKind::Delete => None,
            })
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
