//! In-memory storage backend.

use crate::batch::OperationKind;
use crate::{ColumnFamily, Storage, StorageResult, WriteBatch};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile storage with the same semantics as [`crate::Database`].
///
/// Batches are applied under a single write lock, so readers never observe a
/// partially applied batch.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<HashMap<ColumnFamily, Table>>>,
}

impl MemoryDatabase {
    /// Create an empty in-memory database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in a column family.
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.tables.read().get(&cf).map_or(0, BTreeMap::len)
    }
}

impl Storage for MemoryDatabase {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(&cf)
            .and_then(|table| table.get(key).cloned()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tables
            .write()
            .entry(cf)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        if let Some(table) = self.tables.write().get_mut(&cf) {
            table.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut tables = self.tables.write();
        for op in batch.operations {
            let table = tables.entry(op.cf).or_default();
            match op.kind {
                OperationKind::Put { value } => {
                    table.insert(op.key, value);
                }
                OperationKind::Delete => {
                    table.remove(&op.key);
                }
            }
        }
        Ok(())
    }

    fn iter(
        &self,
        cf: ColumnFamily,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let snapshot: Vec<_> = self
            .tables
            .read()
            .get(&cf)
            .map(|table| table.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Box::new(snapshot.into_iter()))
    }
}
