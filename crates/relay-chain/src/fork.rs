//! Greatest-work chain selection.

use crate::{ChainError, ChainResult, ChainStore, ChainTip, ValidatedHeader};
use num_bigint::BigUint;
use num_traits::Zero;
use relay_consensus::{bits_to_target, work_for_target, DifficultyAdjustment, Hash256};
use relay_storage::WriteBatch;
use tracing::{debug, info, warn};

/// Chain selection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSelection {
    /// New header extends the best chain.
    Extended,
    /// New header causes a chain reorganization.
    Reorg {
        /// Common ancestor height.
        fork_height: u64,
        /// Number of canonical blocks displaced.
        rollback_count: u64,
    },
    /// New header is on a fork with less or equal work.
    Ignored,
}

/// Stores validated headers and moves the tip when a branch wins.
#[derive(Clone)]
pub struct ForkResolver {
    store: ChainStore,
    difficulty: DifficultyAdjustment,
}

impl ForkResolver {
    /// Create a new resolver.
    pub fn new(store: ChainStore, difficulty: DifficultyAdjustment) -> Self {
        Self { store, difficulty }
    }

    /// Commit a validated header and update `tip` if its branch becomes best.
    ///
    /// The record, its chain work, any index rewrites and the new tip go into
    /// one write batch. `tip` is only modified once that batch is written.
    pub fn apply(&self, tip: &mut ChainTip, block: &ValidatedHeader) -> ChainResult<ChainSelection> {
        let mut batch = WriteBatch::new();
        self.store.put_batched(&mut batch, &block.hash, &block.record)?;
        self.store
            .put_chain_work_batched(&mut batch, &block.hash, &block.chain_work);

        let height = block.record.height;
        let parent_work = saturating_sub(&block.chain_work, &block.work);

        if block.record.header.prev_block_hash == tip.head {
            self.store.set_canonical_batched(&mut batch, height, &block.hash);

            let last_epoch_work = if self.difficulty.is_retarget_boundary(height) {
                parent_work
            } else {
                tip.last_epoch_work.clone()
            };
            let new_tip = ChainTip {
                head: block.hash,
                height,
                last_epoch_work,
            };
            self.store.put_tip_batched(&mut batch, &new_tip);
            self.store.write(batch)?;
            *tip = new_tip;

            info!(
                height,
                hash = %block.hash,
                chain_work = %block.chain_work,
                "New best header"
            );
            return Ok(ChainSelection::Extended);
        }

        let head_work = self.store.chain_work(&tip.head)?.ok_or_else(|| {
            ChainError::Corruption(format!("chain work missing for head {}", tip.head))
        })?;

        if block.chain_work <= head_work {
            self.store.write(batch)?;
            debug!(
                height,
                hash = %block.hash,
                chain_work = %block.chain_work,
                best_work = %head_work,
                "Header on chain with less or equal work, ignored"
            );
            return Ok(ChainSelection::Ignored);
        }

        // Heavier branch: rewrite the index down to the fork point
        let epoch_start = self.difficulty.epoch_start(height);
        let mut epoch_start_hash = None;
        let mut hash = block.hash;
        let mut record = block.record;

        let fork_height = loop {
            if self.store.is_canonical_at(&hash, record.height)? {
                break record.height;
            }
            self.store.set_canonical_batched(&mut batch, record.height, &hash);
            if record.height == epoch_start {
                epoch_start_hash = Some(hash);
            }

            hash = record.header.prev_block_hash;
            record = self.store.get(&hash)?.ok_or_else(|| {
                ChainError::Corruption(format!("branch of {} does not reach the index", block.hash))
            })?;
        };

        for stale in (height + 1)..=tip.height {
            self.store.clear_canonical_batched(&mut batch, stale);
        }

        let last_epoch_work = if epoch_start == height {
            parent_work
        } else {
            let start = match epoch_start_hash {
                Some(hash) => hash,
                None => self
                    .store
                    .hash_at_height(epoch_start)?
                    .ok_or(ChainError::HeightNotIndexed(epoch_start))?,
            };
            self.work_before(&start)?
        };

        let rollback_count = tip.height - fork_height;
        let new_tip = ChainTip {
            head: block.hash,
            height,
            last_epoch_work,
        };
        self.store.put_tip_batched(&mut batch, &new_tip);
        self.store.write(batch)?;

        warn!(
            height,
            previous_height = tip.height,
            fork_height,
            rollback_count,
            chain_work = %block.chain_work,
            previous_work = %head_work,
            "Chain reorganization due to higher cumulative work"
        );
        *tip = new_tip;

        Ok(ChainSelection::Reorg {
            fork_height,
            rollback_count,
        })
    }

    /// Chain work accumulated before a stored block.
    pub fn work_before(&self, hash: &Hash256) -> ChainResult<BigUint> {
        let record = self.store.require(hash)?;
        let chain_work = self
            .store
            .chain_work(hash)?
            .ok_or_else(|| ChainError::Corruption(format!("chain work missing for {}", hash)))?;
        let work = work_for_target(&bits_to_target(record.header.bits)?);
        Ok(saturating_sub(&chain_work, &work))
    }
}

pub(crate) fn saturating_sub(a: &BigUint, b: &BigUint) -> BigUint {
    if a > b {
        a - b
    } else {
        BigUint::zero()
    }
}
