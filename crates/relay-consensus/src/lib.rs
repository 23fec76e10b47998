//! # relay-consensus
//!
//! Consensus rules for a Bitcoin-style proof-of-work header chain.
//!
//! This crate provides:
//! - Header parsing, serialization and double SHA-256 block hashing
//! - Compact difficulty encoding and the 2016-block retarget
//! - Median-time-past timestamp floor
//! - Merkle inclusion proof verification
//!
//! ## Difficulty Adjustment
//!
//! Every 2016 blocks the target is rescaled by the time the previous epoch
//! actually took, clamped to a factor of four in either direction and capped
//! at the network's proof-of-work limit.
//!
//! Everything here is pure: no storage, no locking.

mod chain_params;
mod difficulty;
mod error;
mod header;
mod merkle;
mod time;

pub use chain_params::{ChainParams, Network};
pub use difficulty::{
    bits_to_target, check_proof_of_work, is_retarget_boundary, next_target, target_to_bits,
    work_for_target, DifficultyAdjustment,
};
pub use error::{ConsensusError, ConsensusResult};
pub use header::{sha256d, BlockHeader, Hash256, HASH_SIZE};
pub use merkle::{compute_merkle_root, merkle_parent, verify_merkle_proof};
pub use time::{check_block_time, median_time_past, TimestampWindow};

/// Network-independent consensus constants.
pub mod params {
    /// Serialized header size in bytes.
    pub const HEADER_SIZE: usize = 80;

    /// Epoch length for difficulty adjustment (2016 blocks).
    pub const EPOCH_LENGTH: u64 = 2016;

    /// Target block interval in seconds (10 minutes).
    pub const TARGET_SPACING_SECS: u64 = 600;

    /// Expected duration of one epoch in seconds (two weeks).
    pub const TARGET_TIMESPAN_SECS: u64 = EPOCH_LENGTH * TARGET_SPACING_SECS;

    /// Maximum factor by which the target may move per retarget.
    pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

    /// Number of ancestor timestamps in the median-time-past window.
    pub const MEDIAN_TIME_SPAN: usize = 11;
}
