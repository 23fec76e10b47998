//! Error types for chain management.

use relay_consensus::Hash256;
use thiserror::Error;

/// Chain management errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] relay_storage::StorageError),

    /// Consensus error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] relay_consensus::ConsensusError),

    /// Header is already stored.
    #[error("Block already exists: {0}")]
    BlockAlreadyExists(Hash256),

    /// Parent header is not stored.
    #[error("Previous block does not exist: {0}")]
    PrevBlockDoesNotExist(Hash256),

    /// Batch has no headers.
    #[error("Empty header batch")]
    EmptyBatch,

    /// Batch exceeds the configured cap.
    #[error("Batch too large: {size} headers, max {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Batch headers do not form a chain hanging off a stored block.
    #[error("Invalid batch order at index {index}")]
    InvalidBatchOrder { index: usize },

    /// Block hash not known to the store.
    #[error("Unknown block: {0}")]
    UnknownBlock(Hash256),

    /// No canonical block at this height.
    #[error("Height not indexed: {0}")]
    HeightNotIndexed(u64),

    /// Initial block height is not a retarget boundary.
    #[error("Initial block height {0} is not a retarget boundary")]
    InvalidInitialBlockHeight(u64),

    /// Store already holds a chain.
    #[error("Chain already initialized")]
    AlreadyInitialized,

    /// Store holds no chain.
    #[error("Chain not initialized")]
    NotInitialized,

    /// Stored data is inconsistent.
    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
