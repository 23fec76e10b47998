//! Block header codec and hashing.
//!
//! Wire layout (80 bytes, integers little-endian):
//!
//! | offset | field           |
//! |--------|-----------------|
//! | 0      | version (u32)   |
//! | 4      | prev block hash |
//! | 36     | merkle root     |
//! | 68     | time (u32)      |
//! | 72     | bits (u32)      |
//! | 76     | nonce (u32)     |

use crate::params::HEADER_SIZE;
use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> [u8; HASH_SIZE] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// A 32-byte hash in internal byte order.
///
/// Displayed and parsed byte-reversed, the way block explorers print block
/// hashes and transaction ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    /// The all-zero hash (genesis parent).
    pub const ZERO: Hash256 = Hash256([0u8; HASH_SIZE]);

    /// Wrap bytes that are already in internal order.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> ConsensusResult<Self> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            ConsensusError::InvalidHash(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Internal byte order.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// The hash read as a little-endian 256-bit integer, for target comparison.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(s).map_err(|e| ConsensusError::InvalidHash(e.to_string()))?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A parsed block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version.
    pub version: u32,
    /// Hash of the parent header.
    pub prev_block_hash: Hash256,
    /// Root of the transaction Merkle tree.
    pub merkle_root: Hash256,
    /// Timestamp in seconds since the Unix epoch.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Parse a raw header and compute its block hash.
    pub fn parse(raw: &[u8]) -> ConsensusResult<(Self, Hash256)> {
        let buf: &[u8; HEADER_SIZE] = raw
            .try_into()
            .map_err(|_| ConsensusError::MalformedHeader { len: raw.len() })?;

        let header = Self {
            version: read_u32(buf, 0),
            prev_block_hash: read_hash(buf, 4),
            merkle_root: read_hash(buf, 36),
            time: read_u32(buf, 68),
            bits: read_u32(buf, 72),
            nonce: read_u32(buf, 76),
        };

        Ok((header, Hash256(sha256d(buf))))
    }

    /// Parse a hex-encoded raw header.
    pub fn from_hex(s: &str) -> ConsensusResult<(Self, Hash256)> {
        let raw = hex::decode(s.trim()).map_err(|e| ConsensusError::InvalidHash(e.to_string()))?;
        Self::parse(&raw)
    }

    /// Serialize to the 80-byte wire format.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Double SHA-256 of the serialized header.
    pub fn block_hash(&self) -> Hash256 {
        Hash256(sha256d(&self.serialize()))
    }
}

fn read_u32(buf: &[u8; HEADER_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_hash(buf: &[u8; HEADER_SIZE], offset: usize) -> Hash256 {
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&buf[offset..offset + HASH_SIZE]);
    Hash256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
    const BLOCK_1: &str = "010000006fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000982051fd1e4ba744bbbe680e1fee14677ba1a3c3540bf7b1cdb606e857233e0e61bc6649ffff001d01e36299";

    #[test]
    fn test_parse_genesis() {
        let (header, hash) = BlockHeader::from_hex(GENESIS).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.prev_block_hash, Hash256::ZERO);
        assert_eq!(header.time, 1231006505);
        assert_eq!(header.bits, 0x1d00ffff);
        assert_eq!(header.nonce, 2083236893);
        assert_eq!(
            header.merkle_root.to_string(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
        assert_eq!(
            hash.to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(header.block_hash(), hash);
    }

    #[test]
    fn test_block_1_links_to_genesis() {
        let (genesis, genesis_hash) = BlockHeader::from_hex(GENESIS).unwrap();
        let (block1, hash1) = BlockHeader::from_hex(BLOCK_1).unwrap();

        assert_eq!(block1.prev_block_hash, genesis_hash);
        assert_eq!(block1.bits, genesis.bits);
        assert_eq!(
            hash1.to_string(),
            "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048"
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let raw = hex::decode(BLOCK_1).unwrap();
        let (header, _) = BlockHeader::parse(&raw).unwrap();
        assert_eq!(header.serialize().to_vec(), raw);
    }

    #[test]
    fn test_malformed_length() {
        for len in [0usize, 79, 81] {
            let raw = vec![0u8; len];
            assert_eq!(
                BlockHeader::parse(&raw).unwrap_err(),
                ConsensusError::MalformedHeader { len }
            );
        }
    }

    #[test]
    fn test_hash_display_is_reversed() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[0] = 0xab;
        let hash = Hash256::new(bytes);
        let shown = hash.to_string();
        assert!(shown.ends_with("ab"));
        assert_eq!(shown.parse::<Hash256>().unwrap(), hash);
    }

    #[test]
    fn test_hash_parse_errors() {
        assert!(matches!(
            "zz".parse::<Hash256>(),
            Err(ConsensusError::InvalidHash(_))
        ));
        assert!(matches!(
            "abcd".parse::<Hash256>(),
            Err(ConsensusError::InvalidHash(_))
        ));
    }
}
