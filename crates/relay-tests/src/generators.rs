//! Test data generators.
//!
//! Mines devnet headers (roughly every other nonce meets the devnet limit)
//! and builds Merkle trees with inclusion proofs.

use relay_consensus::{
    bits_to_target, merkle_parent, sha256d, BlockHeader, ChainParams, DifficultyAdjustment,
    Hash256,
};

/// Grind the nonce until the header meets the target its bits encode.
///
/// Headers whose bits do not decode are returned unchanged.
pub fn mine(mut header: BlockHeader) -> BlockHeader {
    let Ok(target) = bits_to_target(header.bits) else {
        return header;
    };
    while header.block_hash().to_biguint() > target {
        header.nonce = header.nonce.wrapping_add(1);
    }
    header
}

/// Grind the nonce until the header misses its target.
pub fn mine_invalid(mut header: BlockHeader) -> BlockHeader {
    let target = bits_to_target(header.bits).expect("valid bits");
    while header.block_hash().to_biguint() <= target {
        header.nonce = header.nonce.wrapping_add(1);
    }
    header
}

/// Builds a linked run of headers with the bits the chain expects.
///
/// Headers are kept from a base height so boundary bits can be derived
/// from the epoch's first timestamp. Branches share their prefix by cloning.
#[derive(Clone)]
pub struct ChainBuilder {
    difficulty: DifficultyAdjustment,
    base_height: u64,
    headers: Vec<BlockHeader>,
    tag: u8,
}

impl ChainBuilder {
    /// Start from the network's genesis header.
    pub fn new(params: &ChainParams) -> Self {
        let (genesis, _) = params.genesis().expect("valid genesis");
        Self::from_header(params, genesis, 0)
    }

    /// Start from an arbitrary header at `height`.
    pub fn from_header(params: &ChainParams, header: BlockHeader, height: u64) -> Self {
        Self {
            difficulty: DifficultyAdjustment::new(params).expect("valid params"),
            base_height: height,
            headers: vec![header],
            tag: 0,
        }
    }

    /// Set the byte that fills merkle roots of headers mined from now on.
    pub fn tagged(mut self, tag: u8) -> Self {
        self.tag = tag;
        self
    }

    /// Copy of this chain cut back to `height`, with a new tag.
    pub fn fork(&self, height: u64, tag: u8) -> Self {
        let mut branch = self.clone();
        branch.headers.truncate((height - self.base_height + 1) as usize);
        branch.tag = tag;
        branch
    }

    /// Height of the last header.
    pub fn height(&self) -> u64 {
        self.base_height + self.headers.len() as u64 - 1
    }

    /// Last header.
    pub fn tip(&self) -> &BlockHeader {
        self.headers.last().expect("builder is never empty")
    }

    /// Hash of the last header.
    pub fn tip_hash(&self) -> Hash256 {
        self.tip().block_hash()
    }

    /// Header at `height`.
    pub fn at(&self, height: u64) -> &BlockHeader {
        &self.headers[(height - self.base_height) as usize]
    }

    /// Hash of the header at `height`.
    pub fn hash_at(&self, height: u64) -> Hash256 {
        self.at(height).block_hash()
    }

    /// Headers from `height` up to the tip.
    pub fn since(&self, height: u64) -> &[BlockHeader] {
        &self.headers[(height - self.base_height) as usize..]
    }

    /// Bits the next header must carry.
    pub fn next_bits(&self) -> u32 {
        let height = self.height() + 1;
        let tip = self.tip();
        if !self.difficulty.is_retarget_boundary(height) {
            return tip.bits;
        }
        let first = self.at(height - self.difficulty.epoch_length());
        self.difficulty
            .next_bits(tip.bits, first.time, tip.time)
            .expect("valid bits")
    }

    /// Unmined child of the tip with the expected bits.
    pub fn template(&self, time: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: self.tip_hash(),
            merkle_root: Hash256::new([self.tag; 32]),
            time,
            bits: self.next_bits(),
            nonce: 0,
        }
    }

    /// Append a header as given.
    pub fn push(&mut self, header: BlockHeader) -> BlockHeader {
        self.headers.push(header);
        header
    }

    /// Mine the next header `spacing` seconds after the tip.
    pub fn mine_next(&mut self, spacing: u32) -> BlockHeader {
        let header = mine(self.template(self.tip().time + spacing));
        self.push(header)
    }

    /// Mine the next header committing to `merkle_root`.
    pub fn mine_with_root(&mut self, spacing: u32, merkle_root: Hash256) -> BlockHeader {
        let mut header = self.template(self.tip().time + spacing);
        header.merkle_root = merkle_root;
        self.push(mine(header))
    }

    /// Mine `count` headers at a fixed spacing.
    pub fn mine_many(&mut self, count: usize, spacing: u32) -> Vec<BlockHeader> {
        (0..count).map(|_| self.mine_next(spacing)).collect()
    }
}

/// Deterministic transaction ids.
pub fn tx_ids(count: usize, seed: u8) -> Vec<Hash256> {
    (0..count as u32)
        .map(|i| {
            let mut data = vec![seed];
            data.extend_from_slice(&i.to_le_bytes());
            Hash256::new(sha256d(&data))
        })
        .collect()
}

/// Merkle tree over transaction ids.
///
/// Levels with an odd count pair their last node with itself.
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build the tree from its leaves.
    pub fn new(leaves: Vec<Hash256>) -> Self {
        assert!(!leaves.is_empty(), "tree needs at least one leaf");
        let mut levels = vec![leaves];
        loop {
            let level = levels.last().expect("at least one level");
            if level.len() == 1 {
                break;
            }
            let next = level
                .chunks(2)
                .map(|pair| merkle_parent(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root hash.
    pub fn root(&self) -> Hash256 {
        self.levels[self.levels.len() - 1][0]
    }

    /// Leaf hashes.
    pub fn leaves(&self) -> &[Hash256] {
        &self.levels[0]
    }

    /// Sibling path from leaf `index` to the root, leaf level first.
    pub fn proof(&self, index: usize) -> Vec<Hash256> {
        let mut proof = Vec::with_capacity(self.levels.len() - 1);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = level.get(position ^ 1).unwrap_or(&level[position]);
            proof.push(*sibling);
            position >>= 1;
        }
        proof
    }
}
