//! Header storage and indexing.
//!
//! Plain data access over a `Storage` backend: no validation happens here.

use crate::{columns, ChainError, ChainResult};
use num_bigint::BigUint;
use relay_consensus::params::HEADER_SIZE;
use relay_consensus::{BlockHeader, Hash256};
use relay_storage::{Storage, WriteBatch};
use std::sync::Arc;

/// Metadata keys.
mod keys {
    pub const BEST_HEADER_ID: &[u8] = b"best_header_id";
    pub const BEST_HEIGHT: &[u8] = b"best_height";
    pub const LAST_EPOCH_WORK: &[u8] = b"last_epoch_work";
    pub const CHECKPOINT_ID: &[u8] = b"checkpoint_id";
    pub const CHECKPOINT_HEIGHT: &[u8] = b"checkpoint_height";
}

const RECORD_SIZE: usize = HEADER_SIZE + 8;

/// A stored header together with its height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Parsed header.
    pub header: BlockHeader,
    /// Height on its branch.
    pub height: u64,
}

impl BlockRecord {
    /// Encode as the raw header followed by the big-endian height.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_SIZE);
        out.extend_from_slice(&self.header.serialize());
        out.extend_from_slice(&self.height.to_be_bytes());
        out
    }

    /// Decode a stored record. Returns the record and its block hash.
    pub fn decode(bytes: &[u8]) -> ChainResult<(Self, Hash256)> {
        if bytes.len() != RECORD_SIZE {
            return Err(ChainError::Corruption(format!(
                "header record of {} bytes",
                bytes.len()
            )));
        }
        let (header, hash) = BlockHeader::parse(&bytes[..HEADER_SIZE])?;
        let height = decode_u64(&bytes[HEADER_SIZE..])?;
        Ok((Self { header, height }, hash))
    }
}

/// Best-chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    /// Hash of the best header.
    pub head: Hash256,
    /// Height of the best header.
    pub height: u64,
    /// Chain work accumulated before the first block of the head's epoch.
    pub last_epoch_work: BigUint,
}

/// Header storage and indexing.
#[derive(Clone)]
pub struct ChainStore {
    storage: Arc<dyn Storage>,
}

impl ChainStore {
    /// Create a new chain store.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Get a record by block hash.
    pub fn get(&self, hash: &Hash256) -> ChainResult<Option<BlockRecord>> {
        match self.storage.get(columns::HEADERS, hash.as_bytes())? {
            Some(bytes) => Ok(Some(BlockRecord::decode(&bytes)?.0)),
            None => Ok(None),
        }
    }

    /// Get a record, failing with `UnknownBlock` when absent.
    pub fn require(&self, hash: &Hash256) -> ChainResult<BlockRecord> {
        self.get(hash)?.ok_or(ChainError::UnknownBlock(*hash))
    }

    /// Check if a block is stored.
    pub fn contains(&self, hash: &Hash256) -> ChainResult<bool> {
        Ok(self.storage.contains(columns::HEADERS, hash.as_bytes())?)
    }

    /// Store a record (batched version).
    pub fn put_batched(
        &self,
        batch: &mut WriteBatch,
        hash: &Hash256,
        record: &BlockRecord,
    ) -> ChainResult<()> {
        let pending = batch.pending(columns::HEADERS, hash.as_bytes()).flatten();
        if pending.is_some() || self.contains(hash)? {
            return Err(ChainError::BlockAlreadyExists(*hash));
        }
        batch.put(columns::HEADERS, hash.as_bytes().to_vec(), record.encode());
        Ok(())
    }

    /// Height of a stored block.
    pub fn height_of(&self, hash: &Hash256) -> ChainResult<Option<u64>> {
        Ok(self.get(hash)?.map(|record| record.height))
    }

    /// Canonical block hash at a height.
    pub fn hash_at_height(&self, height: u64) -> ChainResult<Option<Hash256>> {
        match self.storage.get(columns::HEADER_CHAIN, &height.to_be_bytes())? {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether `hash` is the canonical block at `height`.
    pub fn is_canonical_at(&self, hash: &Hash256, height: u64) -> ChainResult<bool> {
        Ok(self.hash_at_height(height)?.as_ref() == Some(hash))
    }

    /// Point the canonical index at `hash` for `height` (batched).
    pub fn set_canonical_batched(&self, batch: &mut WriteBatch, height: u64, hash: &Hash256) {
        batch.put(
            columns::HEADER_CHAIN,
            height.to_be_bytes().to_vec(),
            hash.as_bytes().to_vec(),
        );
    }

    /// Remove the canonical index entry for `height` (batched).
    pub fn clear_canonical_batched(&self, batch: &mut WriteBatch, height: u64) {
        batch.delete(columns::HEADER_CHAIN, height.to_be_bytes().to_vec());
    }

    /// Cumulative chain work of a stored block.
    pub fn chain_work(&self, hash: &Hash256) -> ChainResult<Option<BigUint>> {
        Ok(self
            .storage
            .get(columns::CHAIN_WORK, hash.as_bytes())?
            .map(|bytes| BigUint::from_bytes_be(&bytes)))
    }

    /// Store cumulative chain work for a block (batched).
    pub fn put_chain_work_batched(&self, batch: &mut WriteBatch, hash: &Hash256, work: &BigUint) {
        batch.put(
            columns::CHAIN_WORK,
            hash.as_bytes().to_vec(),
            work.to_bytes_be(),
        );
    }

    /// Load the chain tip, if the store has been initialized.
    pub fn load_tip(&self) -> ChainResult<Option<ChainTip>> {
        let Some(head) = self.storage.get(columns::METADATA, keys::BEST_HEADER_ID)? else {
            return Ok(None);
        };
        let head = Hash256::from_slice(&head)?;

        let height = self
            .storage
            .get(columns::METADATA, keys::BEST_HEIGHT)?
            .ok_or_else(|| ChainError::Corruption("best height missing".to_string()))?;
        let height = decode_u64(&height)?;

        let last_epoch_work = self
            .storage
            .get(columns::METADATA, keys::LAST_EPOCH_WORK)?
            .map(|bytes| BigUint::from_bytes_be(&bytes))
            .unwrap_or_default();

        Ok(Some(ChainTip {
            head,
            height,
            last_epoch_work,
        }))
    }

    /// Persist the chain tip (batched).
    pub fn put_tip_batched(&self, batch: &mut WriteBatch, tip: &ChainTip) {
        batch.put(
            columns::METADATA,
            keys::BEST_HEADER_ID,
            tip.head.as_bytes().to_vec(),
        );
        batch.put(
            columns::METADATA,
            keys::BEST_HEIGHT,
            tip.height.to_be_bytes().to_vec(),
        );
        batch.put(
            columns::METADATA,
            keys::LAST_EPOCH_WORK,
            tip.last_epoch_work.to_bytes_be(),
        );
    }

    /// The block the chain was initialized from.
    pub fn checkpoint(&self) -> ChainResult<Option<(Hash256, u64)>> {
        let Some(hash) = self.storage.get(columns::METADATA, keys::CHECKPOINT_ID)? else {
            return Ok(None);
        };
        let height = self
            .storage
            .get(columns::METADATA, keys::CHECKPOINT_HEIGHT)?
            .ok_or_else(|| ChainError::Corruption("checkpoint height missing".to_string()))?;
        Ok(Some((Hash256::from_slice(&hash)?, decode_u64(&height)?)))
    }

    /// Record the initialization block (batched).
    pub fn put_checkpoint_batched(&self, batch: &mut WriteBatch, hash: &Hash256, height: u64) {
        batch.put(
            columns::METADATA,
            keys::CHECKPOINT_ID,
            hash.as_bytes().to_vec(),
        );
        batch.put(
            columns::METADATA,
            keys::CHECKPOINT_HEIGHT,
            height.to_be_bytes().to_vec(),
        );
    }

    /// Commit a batch atomically.
    pub fn write(&self, batch: WriteBatch) -> ChainResult<()> {
        self.storage.write_batch(batch)?;
        Ok(())
    }
}

fn decode_u64(bytes: &[u8]) -> ChainResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ChainError::Corruption(format!("expected 8-byte integer, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}
