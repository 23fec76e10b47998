//! Merkle inclusion proofs.
//!
//! Hashes are concatenated in internal byte order. A proof lists one sibling
//! per tree level, leaf level first; bit `i` of the transaction index selects
//! whether the sibling at level `i` sits on the left (bit set) or the right.

use crate::{sha256d, Hash256};

/// Levels addressable by a 64-bit transaction index.
const MAX_PROOF_DEPTH: usize = u64::BITS as usize;

/// Hash two children into their parent node.
pub fn merkle_parent(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Hash256::new(sha256d(&buf))
}

/// Fold a proof from the leaf up to the root.
///
/// Returns `None` when `tx_index` addresses a position outside a tree of
/// `proof.len()` levels, when the proof is deeper than a `u64` index can
/// address, or when a left sibling equals the node it pairs with. Odd levels
/// duplicate their last node on the right, so a left duplicate would let a
/// second index verify the same leaf.
pub fn compute_merkle_root(tx_id: &Hash256, tx_index: u64, proof: &[Hash256]) -> Option<Hash256> {
    if proof.len() > MAX_PROOF_DEPTH {
        return None;
    }
    let depth = proof.len() as u32;
    if tx_index.checked_shr(depth).unwrap_or(0) != 0 {
        return None;
    }

    let mut node = *tx_id;
    for (level, sibling) in proof.iter().enumerate() {
        node = if (tx_index >> level) & 1 == 1 {
            if *sibling == node {
                return None;
            }
            merkle_parent(sibling, &node)
        } else {
            merkle_parent(&node, sibling)
        };
    }

    Some(node)
}

/// Check that `tx_id` at `tx_index` hashes up to `root` through `proof`.
pub fn verify_merkle_proof(root: &Hash256, tx_id: &Hash256, tx_index: u64, proof: &[Hash256]) -> bool {
    compute_merkle_root(tx_id, tx_index, proof).as_ref() == Some(root)
}
