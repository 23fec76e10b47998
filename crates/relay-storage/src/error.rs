//! Storage errors.

use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error reported by RocksDB.
    #[error("RocksDB: {0}")]
    Database(#[from] rocksdb::Error),

    /// The database was opened without this column family.
    #[error("Missing column family '{0}'")]
    ColumnFamilyNotFound(&'static str),

    /// Write attempted on a read-only handle.
    #[error("Write to '{0}' rejected: database opened read-only")]
    ReadOnly(&'static str),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
