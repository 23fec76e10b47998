//! The header relay facade.
//!
//! Owns the chain tip behind a read/write lock. Mutations hold the write guard
//! for their whole duration; queries hold the read guard, so they never
//! observe a partially applied reorganization.

use crate::fork::saturating_sub;
use crate::{
    BlockRecord, ChainError, ChainExtender, ChainResult, ChainSelection, ChainStore, ChainTip,
    ForkResolver,
};
use num_bigint::BigUint;
use parking_lot::RwLock;
use relay_consensus::{
    bits_to_target, compute_merkle_root, work_for_target, BlockHeader, ChainParams,
    DifficultyAdjustment, Hash256, TimestampWindow,
};
use relay_storage::{Storage, WriteBatch};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default cap on headers per batch (one difficulty epoch).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 2016;

/// Runtime policy for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum number of headers accepted by one batch call.
    pub max_batch_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Canonical status of a stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStatus {
    /// Whether the block is on the best chain.
    pub is_canonical: bool,
    /// Blocks built on top of it on the best chain; zero when not canonical.
    pub confirmations: u64,
}

/// Receives a callback whenever the best header changes.
pub trait HeadListener: Send + Sync {
    /// Called at most once per mutating call, after the lock is released.
    fn on_head_updated(&self, head: &Hash256, height: u64);
}

/// SPV header relay: validates pushed headers and tracks the best chain.
pub struct HeaderRelay {
    store: ChainStore,
    extender: ChainExtender,
    resolver: ForkResolver,
    params: ChainParams,
    config: RelayConfig,
    checkpoint_height: u64,
    tip: RwLock<ChainTip>,
    listeners: RwLock<Vec<Arc<dyn HeadListener>>>,
}

impl HeaderRelay {
    /// Initialize an empty store from the network's genesis header.
    pub fn init_genesis(
        storage: Arc<dyn Storage>,
        params: ChainParams,
        config: RelayConfig,
    ) -> ChainResult<Self> {
        let raw = params.genesis_raw()?;
        Self::init_checkpoint(storage, params, config, &raw, 0, BigUint::default())
    }

    /// Initialize an empty store from a trusted header at a retarget boundary.
    ///
    /// `chain_work` is the cumulative work of the chain ending at that header.
    #[instrument(skip(storage, params, config, raw, chain_work), fields(network = %params.network))]
    pub fn init_checkpoint(
        storage: Arc<dyn Storage>,
        params: ChainParams,
        config: RelayConfig,
        raw: &[u8],
        height: u64,
        chain_work: BigUint,
    ) -> ChainResult<Self> {
        let store = ChainStore::new(storage);
        if store.load_tip()?.is_some() {
            return Err(ChainError::AlreadyInitialized);
        }

        let difficulty = DifficultyAdjustment::new(&params)?;
        let (header, hash) = BlockHeader::parse(raw)?;
        if !difficulty.is_retarget_boundary(height) {
            return Err(ChainError::InvalidInitialBlockHeight(height));
        }
        let work = work_for_target(&bits_to_target(header.bits)?);

        let tip = ChainTip {
            head: hash,
            height,
            last_epoch_work: saturating_sub(&chain_work, &work),
        };

        let mut batch = WriteBatch::new();
        store.put_batched(&mut batch, &hash, &BlockRecord { header, height })?;
        store.put_chain_work_batched(&mut batch, &hash, &chain_work);
        store.set_canonical_batched(&mut batch, height, &hash);
        store.put_checkpoint_batched(&mut batch, &hash, height);
        store.put_tip_batched(&mut batch, &tip);
        store.write(batch)?;

        info!(%hash, height, chain_work = %chain_work, "Header chain initialized");

        Ok(Self::assemble(store, difficulty, params, config, height, tip))
    }

    /// Reopen a previously initialized store.
    pub fn open(
        storage: Arc<dyn Storage>,
        params: ChainParams,
        config: RelayConfig,
    ) -> ChainResult<Self> {
        let store = ChainStore::new(storage);
        let tip = store.load_tip()?.ok_or(ChainError::NotInitialized)?;
        let (_, checkpoint_height) = store
            .checkpoint()?
            .ok_or_else(|| ChainError::Corruption("checkpoint metadata missing".to_string()))?;
        let difficulty = DifficultyAdjustment::new(&params)?;

        info!(
            head = %tip.head,
            height = tip.height,
            checkpoint_height,
            last_epoch_work = %tip.last_epoch_work,
            "Header chain loaded from storage"
        );

        Ok(Self::assemble(
            store,
            difficulty,
            params,
            config,
            checkpoint_height,
            tip,
        ))
    }

    fn assemble(
        store: ChainStore,
        difficulty: DifficultyAdjustment,
        params: ChainParams,
        config: RelayConfig,
        checkpoint_height: u64,
        tip: ChainTip,
    ) -> Self {
        Self {
            extender: ChainExtender::new(store.clone(), difficulty.clone()),
            resolver: ForkResolver::new(store.clone(), difficulty),
            store,
            params,
            config,
            checkpoint_height,
            tip: RwLock::new(tip),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Network parameters.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Runtime policy.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Height the chain was initialized at.
    pub fn checkpoint_height(&self) -> u64 {
        self.checkpoint_height
    }

    /// Snapshot of the current tip.
    pub fn tip(&self) -> ChainTip {
        self.tip.read().clone()
    }

    /// Register a head-change listener.
    pub fn add_listener(&self, listener: Arc<dyn HeadListener>) {
        self.listeners.write().push(listener);
    }

    // ==================== Mutations ====================

    /// Validate and store one header.
    #[instrument(skip(self, raw), fields(len = raw.len()))]
    pub fn add_block_header(&self, raw: &[u8]) -> ChainResult<ChainSelection> {
        let (result, before, after) = {
            let mut tip = self.tip.write();
            let before = tip.head;
            let result = self
                .extender
                .validate(raw)
                .and_then(|block| self.resolver.apply(&mut tip, &block));
            (result, before, (tip.head, tip.height))
        };

        self.notify_if_changed(before, after);
        result
    }

    /// Validate and store a run of linked headers.
    ///
    /// Structural checks run before anything is applied. After that headers
    /// are applied in order and the first failure stops the batch, leaving
    /// earlier headers committed.
    #[instrument(skip(self, raws), fields(count = raws.len()))]
    pub fn add_block_header_batch<R: AsRef<[u8]>>(
        &self,
        raws: &[R],
    ) -> ChainResult<Vec<ChainSelection>> {
        if raws.is_empty() {
            return Err(ChainError::EmptyBatch);
        }
        if raws.len() > self.config.max_batch_size {
            return Err(ChainError::BatchTooLarge {
                size: raws.len(),
                max: self.config.max_batch_size,
            });
        }

        let mut parsed = Vec::with_capacity(raws.len());
        for raw in raws {
            parsed.push(BlockHeader::parse(raw.as_ref())?);
        }

        let (result, before, after) = {
            let mut tip = self.tip.write();
            let before = tip.head;
            let result = self.apply_batch(&mut tip, raws, &parsed);
            (result, before, (tip.head, tip.height))
        };

        self.notify_if_changed(before, after);
        result
    }

    fn apply_batch<R: AsRef<[u8]>>(
        &self,
        tip: &mut ChainTip,
        raws: &[R],
        parsed: &[(BlockHeader, Hash256)],
    ) -> ChainResult<Vec<ChainSelection>> {
        for (index, pair) in parsed.windows(2).enumerate() {
            if pair[1].0.prev_block_hash != pair[0].1 {
                return Err(ChainError::InvalidBatchOrder { index: index + 1 });
            }
        }
        let first_parent = parsed[0].0.prev_block_hash;
        if !self.store.contains(&first_parent)? {
            return Err(ChainError::InvalidBatchOrder { index: 0 });
        }

        let mut window: TimestampWindow = self.extender.timestamp_window(&first_parent)?;
        let mut selections = Vec::with_capacity(raws.len());

        for (index, raw) in raws.iter().enumerate() {
            let block = self
                .extender
                .validate_with_window(raw.as_ref(), &window)
                .map_err(|e| {
                    warn!(index, error = %e, "Header rejected, stopping batch");
                    e
                })?;
            let selection = self.resolver.apply(tip, &block)?;
            window.push(block.record.header.time);
            selections.push(selection);
        }

        info!(
            count = selections.len(),
            head = %tip.head,
            height = tip.height,
            "Header batch applied"
        );
        Ok(selections)
    }

    fn notify_if_changed(&self, before: Hash256, after: (Hash256, u64)) {
        if before == after.0 {
            return;
        }
        let listeners = self.listeners.read().clone();
        debug!(head = %after.0, height = after.1, listeners = listeners.len(), "Head updated");
        for listener in listeners {
            listener.on_head_updated(&after.0, after.1);
        }
    }

    // ==================== Queries ====================

    /// Hash of the best header.
    pub fn get_mainchain_head(&self) -> Hash256 {
        self.tip.read().head
    }

    /// Height of the best header.
    pub fn get_mainchain_height(&self) -> u64 {
        self.tip.read().height
    }

    /// Canonical status and confirmation depth of a stored block.
    pub fn get_block_status(&self, hash: &Hash256) -> ChainResult<BlockStatus> {
        let tip = self.tip.read();
        let record = self.store.require(hash)?;
        self.status_of(&tip, hash, &record)
    }

    fn status_of(
        &self,
        tip: &ChainTip,
        hash: &Hash256,
        record: &BlockRecord,
    ) -> ChainResult<BlockStatus> {
        let is_canonical =
            record.height <= tip.height && self.store.is_canonical_at(hash, record.height)?;
        let confirmations = if is_canonical {
            tip.height - record.height
        } else {
            0
        };
        Ok(BlockStatus {
            is_canonical,
            confirmations,
        })
    }

    /// Header of a stored block.
    pub fn get_block_header(&self, hash: &Hash256) -> ChainResult<BlockHeader> {
        Ok(self.store.require(hash)?.header)
    }

    /// Merkle root of a stored block.
    pub fn get_block_merkle_root(&self, hash: &Hash256) -> ChainResult<Hash256> {
        Ok(self.store.require(hash)?.header.merkle_root)
    }

    /// Height of a stored block on its own branch.
    pub fn get_block_height(&self, hash: &Hash256) -> ChainResult<u64> {
        Ok(self.store.require(hash)?.height)
    }

    /// Canonical block hash at a height.
    pub fn get_block_hash(&self, height: u64) -> ChainResult<Hash256> {
        let _tip = self.tip.read();
        self.store
            .hash_at_height(height)?
            .ok_or(ChainError::HeightNotIndexed(height))
    }

    /// Decoded target of a stored block.
    pub fn get_block_target(&self, hash: &Hash256) -> ChainResult<BigUint> {
        let record = self.store.require(hash)?;
        Ok(bits_to_target(record.header.bits)?)
    }

    /// Cumulative work of the chain ending at a stored block.
    pub fn get_chain_work(&self, hash: &Hash256) -> ChainResult<BigUint> {
        self.store
            .chain_work(hash)?
            .ok_or(ChainError::UnknownBlock(*hash))
    }

    /// Work of all completed epochs on the best chain.
    pub fn last_epoch_cumulative_work(&self) -> BigUint {
        self.tip.read().last_epoch_work.clone()
    }

    /// Whether a block is stored, on any branch.
    pub fn block_exists(&self, hash: &Hash256) -> ChainResult<bool> {
        self.store.contains(hash)
    }

    /// Whether a block is on the best chain.
    pub fn is_in_mainchain(&self, hash: &Hash256) -> ChainResult<bool> {
        let tip = self.tip.read();
        match self.store.get(hash)? {
            Some(record) => Ok(self.status_of(&tip, hash, &record)?.is_canonical),
            None => Ok(false),
        }
    }

    /// Check that `tx_id` is included in a canonical block with at least
    /// `min_confirmations` blocks on top.
    ///
    /// Unknown, non-canonical and shallow blocks yield `false`.
    pub fn check_tx_inclusion(
        &self,
        proof: &[Hash256],
        block_hash: &Hash256,
        tx_id: &Hash256,
        tx_index: u64,
        min_confirmations: u64,
    ) -> ChainResult<bool> {
        let tip = self.tip.read();
        let Some(record) = self.store.get(block_hash)? else {
            return Ok(false);
        };

        let status = self.status_of(&tip, block_hash, &record)?;
        if !status.is_canonical || status.confirmations < min_confirmations {
            debug!(
                %block_hash,
                is_canonical = status.is_canonical,
                confirmations = status.confirmations,
                min_confirmations,
                "Block not eligible for inclusion check"
            );
            return Ok(false);
        }

        Ok(compute_merkle_root(tx_id, tx_index, proof).as_ref() == Some(&record.header.merkle_root))
    }

    // ==================== Sync helpers ====================

    /// Exponentially spaced canonical hashes from the head down to the
    /// initialization block, for callers syncing from peers.
    pub fn get_header_locator(&self) -> ChainResult<Vec<Hash256>> {
        let tip = self.tip.read();
        let mut locator = Vec::new();
        let mut step = 1u64;
        let mut height = tip.height;

        loop {
            if let Some(hash) = self.store.hash_at_height(height)? {
                locator.push(hash);
            }
            if height == self.checkpoint_height {
                break;
            }

            height = height.saturating_sub(step).max(self.checkpoint_height);

            if locator.len() > 10 {
                step *= 2;
            }
        }

        Ok(locator)
    }

    /// First hash in `hashes` that is on the best chain, with its height.
    pub fn find_common_ancestor(&self, hashes: &[Hash256]) -> ChainResult<Option<(Hash256, u64)>> {
        let tip = self.tip.read();
        for hash in hashes {
            if let Some(record) = self.store.get(hash)? {
                if self.status_of(&tip, hash, &record)?.is_canonical {
                    return Ok(Some((*hash, record.height)));
                }
            }
        }
        Ok(None)
    }

    /// Up to `count` canonical headers starting at `from_height`.
    pub fn get_headers_range(&self, from_height: u64, count: u64) -> ChainResult<Vec<BlockHeader>> {
        let tip = self.tip.read();
        let end = from_height.saturating_add(count).min(tip.height.saturating_add(1));
        let mut headers = Vec::new();

        for height in from_height..end {
            let Some(hash) = self.store.hash_at_height(height)? else {
                continue;
            };
            headers.push(self.store.require(&hash)?.header);
        }

        Ok(headers)
    }
}
