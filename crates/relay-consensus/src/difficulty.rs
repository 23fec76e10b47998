//! Difficulty adjustment algorithm.
//!
//! Targets are carried in headers in the 32-bit compact form: the high byte is
//! a base-256 exponent, the low 23 bits a mantissa and bit 23 a sign. Every
//! `EPOCH_LENGTH` blocks the target is rescaled by how long the previous epoch
//! actually took.

use crate::params::{EPOCH_LENGTH, MAX_ADJUSTMENT_FACTOR, TARGET_TIMESPAN_SECS};
use crate::{ChainParams, ConsensusError, ConsensusResult, Hash256};
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use tracing::debug;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decode compact bits into a 256-bit target.
///
/// Fails for negative encodings, values that do not fit in 256 bits, and a
/// zero target.
pub fn bits_to_target(bits: u32) -> ConsensusResult<BigUint> {
    let size = bits >> 24;
    let word = bits & MANTISSA_MASK;

    if word != 0 && bits & SIGN_BIT != 0 {
        return Err(ConsensusError::InvalidDifficultyBits(bits));
    }

    let overflow =
        word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    if overflow {
        return Err(ConsensusError::InvalidDifficultyBits(bits));
    }

    let target = if size <= 3 {
        BigUint::from(word >> (8 * (3 - size)))
    } else {
        BigUint::from(word) << (8 * (size - 3))
    };

    if target.is_zero() {
        return Err(ConsensusError::InvalidDifficultyBits(bits));
    }

    Ok(target)
}

/// Encode a target in canonical compact form.
///
/// Low-order bits beyond the 23-bit mantissa are truncated, so the result
/// round-trips through [`bits_to_target`] only for normalized targets.
pub fn target_to_bits(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let bytes = target.to_bytes_be();
    let mut size = bytes.len() as u32;

    let mut compact = if size <= 3 {
        target.to_u32().unwrap_or(0) << (8 * (3 - size))
    } else {
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
    };

    // Mantissa must not carry the sign bit
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24)
}

/// Whether a block at `height` starts a new difficulty epoch.
pub fn is_retarget_boundary(height: u64) -> bool {
    height % EPOCH_LENGTH == 0
}

/// Rescale `current` by the elapsed epoch time, clamped to a factor of four.
///
/// Elapsed time may be negative, since timestamps only have to clear the
/// median time past; it clamps to the lower bound like any fast epoch.
pub fn next_target(current: &BigUint, epoch_elapsed_secs: i64) -> BigUint {
    scale_target(current, epoch_elapsed_secs, TARGET_TIMESPAN_SECS)
}

/// Proof-of-work represented by one block at `target`: `2^256 / (target + 1)`.
pub fn work_for_target(target: &BigUint) -> BigUint {
    (BigUint::one() << 256u32) / (target + 1u32)
}

/// Check that a block hash, read as a little-endian integer, meets its target.
pub fn check_proof_of_work(hash: &Hash256, target: &BigUint) -> ConsensusResult<()> {
    if &hash.to_biguint() > target {
        return Err(ConsensusError::InvalidBlockHash { hash: *hash });
    }
    Ok(())
}

fn scale_target(current: &BigUint, elapsed: i64, timespan: u64) -> BigUint {
    let min = (timespan / MAX_ADJUSTMENT_FACTOR) as i64;
    let max = (timespan * MAX_ADJUSTMENT_FACTOR) as i64;
    let clamped = elapsed.clamp(min, max) as u64;
    current * clamped / timespan
}

/// Difficulty adjustment calculator for one network.
#[derive(Debug, Clone)]
pub struct DifficultyAdjustment {
    /// Epoch length in blocks.
    epoch_length: u64,
    /// Expected epoch duration in seconds.
    target_timespan: u64,
    /// Easiest allowed target.
    pow_limit: BigUint,
}

impl DifficultyAdjustment {
    /// Create a calculator for the given network parameters.
    pub fn new(params: &ChainParams) -> ConsensusResult<Self> {
        Ok(Self {
            epoch_length: params.epoch_length,
            target_timespan: params.target_timespan_secs(),
            pow_limit: params.pow_limit()?,
        })
    }

    /// Create with custom parameters (for testing).
    pub fn with_params(epoch_length: u64, target_timespan: u64, pow_limit: BigUint) -> Self {
        Self {
            epoch_length,
            target_timespan,
            pow_limit,
        }
    }

    /// Epoch length in blocks.
    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    /// Easiest allowed target.
    pub fn pow_limit(&self) -> &BigUint {
        &self.pow_limit
    }

    /// Whether a block at `height` starts a new epoch.
    pub fn is_retarget_boundary(&self, height: u64) -> bool {
        height % self.epoch_length == 0
    }

    /// Height of the first block of the epoch containing `height`.
    pub fn epoch_start(&self, height: u64) -> u64 {
        height - height % self.epoch_length
    }

    /// Next target from the current one, capped at the proof-of-work limit.
    pub fn next_target(&self, current: &BigUint, epoch_elapsed_secs: i64) -> BigUint {
        let next = scale_target(current, epoch_elapsed_secs, self.target_timespan);
        if next > self.pow_limit {
            self.pow_limit.clone()
        } else {
            next
        }
    }

    /// Compact bits a boundary header must carry.
    ///
    /// `epoch_first_time` and `epoch_last_time` are the timestamps of the first
    /// and last blocks of the epoch that just completed; `last_bits` is the
    /// last block's difficulty.
    pub fn next_bits(
        &self,
        last_bits: u32,
        epoch_first_time: u32,
        epoch_last_time: u32,
    ) -> ConsensusResult<u32> {
        let current = bits_to_target(last_bits)?;
        let elapsed = i64::from(epoch_last_time) - i64::from(epoch_first_time);
        let next = self.next_target(&current, elapsed);
        let bits = target_to_bits(&next);

        debug!(
            elapsed,
            old_bits = format_args!("{:#010x}", last_bits),
            new_bits = format_args!("{:#010x}", bits),
            "Calculated new difficulty at epoch boundary"
        );

        Ok(bits)
    }

    /// Fail with `InvalidTarget` unless the header carries the expected bits.
    pub fn check_bits(&self, height: u64, got: u32, expected: u32) -> ConsensusResult<()> {
        if got != expected {
            return Err(ConsensusError::InvalidTarget {
                height,
                got,
                expected,
            });
        }
        Ok(())
    }
}
