//! Error types for consensus validation.

use crate::Hash256;
use thiserror::Error;

/// Consensus validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Raw header is not exactly 80 bytes.
    #[error("Malformed header: {len} bytes, expected 80")]
    MalformedHeader { len: usize },

    /// Hash or hex string could not be decoded.
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Compact difficulty is negative, overflows 256 bits or decodes to zero.
    #[error("Invalid difficulty bits: {0:#010x}")]
    InvalidDifficultyBits(u32),

    /// Header carries the wrong difficulty for its height.
    #[error("Invalid target at height {height}: got {got:#010x}, expected {expected:#010x}")]
    InvalidTarget { height: u64, got: u32, expected: u32 },

    /// Block hash does not meet its own target.
    #[error("Block hash {hash} above target")]
    InvalidBlockHash { hash: Hash256 },

    /// Timestamp below the median time past.
    #[error("Invalid block time: {time} below median time past {median}")]
    InvalidBlockTime { time: u32, median: u32 },
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
