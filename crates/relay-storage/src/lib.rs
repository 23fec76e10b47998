//! # relay-storage
//!
//! Storage layer for the header relay.
//!
//! Headers, chain work, the canonical index and tip metadata live in separate
//! column families behind the [`Storage`] trait, with:
//! - Column families for the different kinds of chain data
//! - Atomic batch writes
//! - An in-memory backend for tests and ephemeral relays
//!
//! ## Column Families
//!
//! - `Headers`: Raw 80-byte headers plus height, indexed by block hash
//! - `ChainWork`: Cumulative proof-of-work per block hash
//! - `HeaderChain`: Canonical chain index (height -> block hash)
//! - `Metadata`: Chain tip and initialization metadata

mod batch;
mod database;
mod error;
mod memory;

pub use batch::{BatchOperation, OperationKind, WriteBatch};
pub use database::{ColumnFamily, Database};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDatabase;

/// Key/value store split into column families.
///
/// Implemented by [`Database`] (RocksDB) and [`MemoryDatabase`].
pub trait Storage: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove `key`; a missing key is not an error.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()>;

    /// Whether `key` is present.
    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Apply every operation of `batch` or none of them.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Create an iterator over a column family, in key order.
    fn iter(&self, cf: ColumnFamily) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;
}
