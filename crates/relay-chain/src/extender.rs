//! Header validation against the stored parent.

use crate::{BlockRecord, ChainError, ChainResult, ChainStore};
use num_bigint::BigUint;
use relay_consensus::params::MEDIAN_TIME_SPAN;
use relay_consensus::{
    bits_to_target, check_block_time, check_proof_of_work, work_for_target, BlockHeader,
    DifficultyAdjustment, Hash256, TimestampWindow,
};
use tracing::{debug, instrument};

/// A header that passed every consensus check and may be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedHeader {
    /// Block hash.
    pub hash: Hash256,
    /// Header and height.
    pub record: BlockRecord,
    /// Work contributed by this block alone.
    pub work: BigUint,
    /// Cumulative work of the chain ending at this block.
    pub chain_work: BigUint,
}

/// Validates headers against the branch they extend.
#[derive(Clone)]
pub struct ChainExtender {
    store: ChainStore,
    difficulty: DifficultyAdjustment,
}

impl ChainExtender {
    /// Create a new extender.
    pub fn new(store: ChainStore, difficulty: DifficultyAdjustment) -> Self {
        Self { store, difficulty }
    }

    /// Validate a raw header, reading the median-time window from the store.
    pub fn validate(&self, raw: &[u8]) -> ChainResult<ValidatedHeader> {
        self.validate_inner(raw, None)
    }

    /// Validate a raw header against a caller-maintained timestamp window
    /// whose newest entry is the parent's time.
    pub fn validate_with_window(
        &self,
        raw: &[u8],
        window: &TimestampWindow,
    ) -> ChainResult<ValidatedHeader> {
        self.validate_inner(raw, Some(window))
    }

    #[instrument(skip(self, raw, window), fields(len = raw.len()))]
    fn validate_inner(
        &self,
        raw: &[u8],
        window: Option<&TimestampWindow>,
    ) -> ChainResult<ValidatedHeader> {
        // 1. Parse, reject duplicates
        let (header, hash) = BlockHeader::parse(raw)?;
        if self.store.contains(&hash)? {
            return Err(ChainError::BlockAlreadyExists(hash));
        }

        // 2. Parent must be stored
        let parent = self
            .store
            .get(&header.prev_block_hash)?
            .ok_or(ChainError::PrevBlockDoesNotExist(header.prev_block_hash))?;
        let parent_work = self.store.chain_work(&header.prev_block_hash)?.ok_or_else(|| {
            ChainError::Corruption(format!("chain work missing for {}", header.prev_block_hash))
        })?;

        // 3. Height
        let height = parent.height + 1;

        // 4. Difficulty and proof-of-work
        let expected = self.expected_bits(&header.prev_block_hash, &parent, height)?;
        self.difficulty.check_bits(height, header.bits, expected)?;
        let target = bits_to_target(header.bits)?;
        check_proof_of_work(&hash, &target)?;

        // 5. Median time past
        let median = match window {
            Some(window) => window.median_time_past(),
            None => self.timestamp_window(&header.prev_block_hash)?.median_time_past(),
        };
        check_block_time(header.time, median)?;

        let work = work_for_target(&target);
        let chain_work = &parent_work + &work;

        debug!(height, %hash, "Header validated");

        Ok(ValidatedHeader {
            hash,
            record: BlockRecord { header, height },
            work,
            chain_work,
        })
    }

    /// Compact bits a child of `parent` at `height` must carry.
    pub fn expected_bits(
        &self,
        parent_hash: &Hash256,
        parent: &BlockRecord,
        height: u64,
    ) -> ChainResult<u32> {
        if !self.difficulty.is_retarget_boundary(height) {
            return Ok(parent.header.bits);
        }

        let epoch_first_height = height - self.difficulty.epoch_length();
        let first = self.ancestor(parent_hash, parent, epoch_first_height)?;
        Ok(self
            .difficulty
            .next_bits(parent.header.bits, first.header.time, parent.header.time)?)
    }

    /// Ancestor of `from` at `height` on the same branch.
    ///
    /// Walks parent links until the branch meets the canonical chain, then
    /// reads the height index.
    pub fn ancestor(
        &self,
        from_hash: &Hash256,
        from: &BlockRecord,
        height: u64,
    ) -> ChainResult<BlockRecord> {
        let mut hash = *from_hash;
        let mut record = *from;

        while record.height > height {
            if self.store.is_canonical_at(&hash, record.height)? {
                let canonical = self
                    .store
                    .hash_at_height(height)?
                    .ok_or(ChainError::HeightNotIndexed(height))?;
                return self.store.require(&canonical);
            }
            hash = record.header.prev_block_hash;
            record = self.store.get(&hash)?.ok_or_else(|| {
                ChainError::Corruption(format!("ancestor {} missing below height {}", hash, height))
            })?;
        }

        if record.height != height {
            return Err(ChainError::HeightNotIndexed(height));
        }
        Ok(record)
    }

    /// Timestamps of up to eleven ancestors ending at `parent_hash`, oldest
    /// first. Stops early at the initialization block.
    pub fn timestamp_window(&self, parent_hash: &Hash256) -> ChainResult<TimestampWindow> {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut next = Some(*parent_hash);

        while let Some(hash) = next {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            match self.store.get(&hash)? {
                Some(record) => {
                    times.push(record.header.time);
                    next = Some(record.header.prev_block_hash);
                }
                None => next = None,
            }
        }

        times.reverse();
        Ok(TimestampWindow::from_ancestors(times))
    }
}
