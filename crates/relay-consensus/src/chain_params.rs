//! Chain parameters for the supported networks.
//!
//! - `ChainParams::mainnet()` for the production chain
//! - `ChainParams::devnet()` for a private low-difficulty chain

use crate::params::{EPOCH_LENGTH, TARGET_SPACING_SECS};
use crate::{bits_to_target, BlockHeader, ConsensusError, ConsensusResult, Hash256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAINNET_GENESIS: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

const DEVNET_GENESIS: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4adae5494dffff7f2002000000";

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production chain.
    #[default]
    Mainnet,
    /// Private chain with the easiest possible target.
    Devnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Devnet => f.write_str("devnet"),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "devnet" | "regtest" => Ok(Network::Devnet),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// Static consensus parameters of one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    /// Network these parameters belong to.
    pub network: Network,
    /// Hex of the 80-byte genesis header.
    pub genesis_header_hex: &'static str,
    /// Compact form of the easiest allowed target.
    pub pow_limit_bits: u32,
    /// Epoch length in blocks.
    pub epoch_length: u64,
    /// Target block interval in seconds.
    pub target_spacing_secs: u64,
}

impl ChainParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            genesis_header_hex: MAINNET_GENESIS,
            pow_limit_bits: 0x1d00ffff,
            epoch_length: EPOCH_LENGTH,
            target_spacing_secs: TARGET_SPACING_SECS,
        }
    }

    /// Devnet parameters.
    pub fn devnet() -> Self {
        Self {
            network: Network::Devnet,
            genesis_header_hex: DEVNET_GENESIS,
            pow_limit_bits: 0x207fffff,
            epoch_length: EPOCH_LENGTH,
            target_spacing_secs: TARGET_SPACING_SECS,
        }
    }

    /// Parameters for a network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Devnet => Self::devnet(),
        }
    }

    /// Expected epoch duration in seconds.
    pub fn target_timespan_secs(&self) -> u64 {
        self.epoch_length * self.target_spacing_secs
    }

    /// Easiest allowed target.
    pub fn pow_limit(&self) -> ConsensusResult<BigUint> {
        bits_to_target(self.pow_limit_bits)
    }

    /// Raw genesis header bytes.
    pub fn genesis_raw(&self) -> ConsensusResult<Vec<u8>> {
        hex::decode(self.genesis_header_hex).map_err(|e| ConsensusError::InvalidHash(e.to_string()))
    }

    /// Parsed genesis header and its hash.
    pub fn genesis(&self) -> ConsensusResult<(BlockHeader, Hash256)> {
        BlockHeader::from_hex(self.genesis_header_hex)
    }
}
