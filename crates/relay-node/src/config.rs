//! Node configuration.

use crate::Args;
use anyhow::{anyhow, Context, Result};
use num_bigint::BigUint;
use relay_chain::{RelayConfig, DEFAULT_MAX_BATCH_SIZE};
use relay_consensus::Network;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network (mainnet, devnet).
    pub network: Network,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Maximum headers per batch call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Trusted starting point; genesis when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointConfig>,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Trusted checkpoint to initialize from instead of genesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Height of the checkpoint header (a retarget boundary).
    pub height: u64,
    /// 80-byte header as hex.
    pub header: String,
    /// Cumulative chain work at the checkpoint, hex.
    pub chain_work: String,
}

impl CheckpointConfig {
    /// Raw header bytes.
    pub fn header_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(self.header.trim()).context("Invalid checkpoint header hex")
    }

    /// Parsed chain work.
    pub fn chain_work(&self) -> Result<BigUint> {
        // Hex hygiene: trim whitespace and strip optional 0x prefix
        let cleaned = self.chain_work.trim();
        let cleaned = cleaned
            .strip_prefix("0x")
            .or_else(|| cleaned.strip_prefix("0X"))
            .unwrap_or(cleaned);
        BigUint::parse_bytes(cleaned.as_bytes(), 16)
            .ok_or_else(|| anyhow!("Invalid checkpoint chain work hex: '{}'", self.chain_work))
    }
}

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let network = match args.network {
            Some(ref name) => Some(name.parse::<Network>().map_err(|e| anyhow!(e))?),
            None => None,
        };

        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(network.unwrap_or_default())
        };

        // Override with CLI args
        if let Some(network) = network {
            config.network = network;
        }
        if let Some(ref data_dir) = args.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(max) = args.max_batch_size {
            config.max_batch_size = max;
        }
        if let Some(ref level) = args.log_level {
            config.log_level = level.clone();
        }

        if config.max_batch_size == 0 {
            return Err(anyhow!("max_batch_size must be at least 1"));
        }

        Ok(config)
    }

    /// Create default config for a network.
    pub fn default_for_network(network: Network) -> Self {
        let data_dir = match network {
            Network::Mainnet => PathBuf::from(".relay"),
            Network::Devnet => PathBuf::from(".relay-devnet"),
        };

        Self {
            network,
            data_dir,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            log_level: default_log_level(),
            checkpoint: None,
        }
    }

    /// Relay runtime policy derived from this config.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_batch_size: self.max_batch_size,
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;
    use tempfile::TempDir;

    fn args(config: PathBuf) -> Args {
        Args {
            config,
            data_dir: None,
            network: None,
            max_batch_size: None,
            log_level: None,
            command: Command::Status,
        }
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default_for_network(Network::Mainnet);
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.max_batch_size, 2016);
        assert!(config.checkpoint.is_none());
    }

    #[test]
    fn test_devnet_config() {
        let config = NodeConfig::default_for_network(Network::Devnet);
        assert!(config.data_dir.to_string_lossy().contains("devnet"));
    }

    #[test]
    fn test_load_file_with_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("relay.toml");
        std::fs::write(
            &path,
            r#"
network = "devnet"
data_dir = "/var/lib/relay"
max_batch_size = 500

[checkpoint]
height = 2016
header = "00"
chain_work = "0x1f"
"#,
        )
        .unwrap();

        let mut cli = args(path);
        cli.max_batch_size = Some(100);
        let config = NodeConfig::load(&cli.config, &cli).unwrap();

        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/relay"));
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.log_level, "info");

        let checkpoint = config.checkpoint.unwrap();
        assert_eq!(checkpoint.height, 2016);
        assert_eq!(checkpoint.chain_work().unwrap(), BigUint::from(31u32));
        assert_eq!(checkpoint.header_bytes().unwrap(), vec![0u8]);
    }

    #[test]
    fn test_load_missing_file_uses_network_default() {
        let tmp = TempDir::new().unwrap();
        let mut cli = args(tmp.path().join("absent.toml"));
        cli.network = Some("devnet".to_string());
        let config = NodeConfig::load(&cli.config, &cli).unwrap();
        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.data_dir, PathBuf::from(".relay-devnet"));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let tmp = TempDir::new().unwrap();
        let mut cli = args(tmp.path().join("absent.toml"));
        cli.max_batch_size = Some(0);
        assert!(NodeConfig::load(&cli.config, &cli).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("saved.toml");
        let config = NodeConfig::default_for_network(Network::Devnet);
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path, &args(path.clone())).unwrap();
        assert_eq!(loaded.network, Network::Devnet);
        assert_eq!(loaded.max_batch_size, config.max_batch_size);
    }
}
