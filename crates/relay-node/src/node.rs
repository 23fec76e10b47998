//! Node implementation.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use relay_chain::{ChainError, HeadListener, HeaderRelay};
use relay_consensus::{ChainParams, Hash256};
use relay_storage::Database;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Config file written into the data directory on `init`.
const SAVED_CONFIG_FILE: &str = "relay-node.toml";

/// Logs every head change.
struct HeadLogger;

impl HeadListener for HeadLogger {
    fn on_head_updated(&self, head: &Hash256, height: u64) {
        info!(%head, height, "Best header updated");
    }
}

/// A relay bound to a RocksDB data directory.
pub struct Node {
    relay: HeaderRelay,
    max_batch_size: usize,
}

impl Node {
    /// Create the data directory and initialize the chain.
    pub fn init(config: &NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;
        let db = Arc::new(Database::open(&config.data_dir).context("Failed to open database")?);
        let params = ChainParams::for_network(config.network);

        let relay = match config.checkpoint {
            Some(ref checkpoint) => {
                info!(height = checkpoint.height, "Initializing from checkpoint");
                HeaderRelay::init_checkpoint(
                    db,
                    params,
                    config.relay_config(),
                    &checkpoint.header_bytes()?,
                    checkpoint.height,
                    checkpoint.chain_work()?,
                )
            }
            None => HeaderRelay::init_genesis(db, params, config.relay_config()),
        }
        .context("Failed to initialize header chain")?;

        config
            .save(&config.data_dir.join(SAVED_CONFIG_FILE))
            .context("Failed to save config")?;

        Ok(Self::wrap(relay, config))
    }

    /// Open an initialized data directory.
    pub fn open(config: &NodeConfig) -> Result<Self> {
        let db = Arc::new(Database::open(&config.data_dir).context("Failed to open database")?);
        let relay = HeaderRelay::open(
            db,
            ChainParams::for_network(config.network),
            config.relay_config(),
        )
        .context("Failed to load header chain; run `init` first")?;
        Ok(Self::wrap(relay, config))
    }

    /// Open an initialized data directory for queries only.
    pub fn open_read_only(config: &NodeConfig) -> Result<Self> {
        let db = Arc::new(
            Database::open_read_only(&config.data_dir).context("Failed to open database")?,
        );
        let relay = HeaderRelay::open(
            db,
            ChainParams::for_network(config.network),
            config.relay_config(),
        )
        .context("Failed to load header chain; run `init` first")?;
        Ok(Self::wrap(relay, config))
    }

    fn wrap(relay: HeaderRelay, config: &NodeConfig) -> Self {
        relay.add_listener(Arc::new(HeadLogger));
        Self {
            relay,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Underlying relay.
    #[cfg(test)]
    pub fn relay(&self) -> &HeaderRelay {
        &self.relay
    }

    /// Submit one hex header.
    pub fn submit(&self, header_hex: &str) -> Result<()> {
        let raw = hex::decode(header_hex.trim()).context("Invalid header hex")?;
        let selection = self.relay.add_block_header(&raw)?;
        println!("{:?}", selection);
        Ok(())
    }

    /// Import hex headers from a file in batches.
    ///
    /// Returns the number of headers applied.
    pub fn import(&self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut pending: Vec<Vec<u8>> = Vec::with_capacity(self.max_batch_size);
        let mut applied = 0usize;

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let raw = hex::decode(line)
                .with_context(|| format!("Invalid header hex on line {}", line_no + 1))?;
            pending.push(raw);

            if pending.len() == self.max_batch_size {
                applied += self.flush(&mut pending)?;
            }
        }
        if !pending.is_empty() {
            applied += self.flush(&mut pending)?;
        }

        info!(applied, "Import finished");
        println!("imported {} headers", applied);
        Ok(applied)
    }

    fn flush(&self, pending: &mut Vec<Vec<u8>>) -> Result<usize> {
        let count = pending.len();
        let result = self.relay.add_block_header_batch(pending.as_slice());
        pending.clear();
        match result {
            Ok(selections) => Ok(selections.len()),
            Err(e) => {
                warn!(count, error = %e, "Batch import failed");
                Err(e).context("Header batch rejected")
            }
        }
    }

    /// Print the chain tip.
    pub fn print_status(&self) {
        let tip = self.relay.tip();
        println!("network:          {}", self.relay.params().network);
        println!("head:             {}", tip.head);
        println!("height:           {}", tip.height);
        println!("checkpoint:       {}", self.relay.checkpoint_height());
        println!("last epoch work:  {:#x}", tip.last_epoch_work);
    }

    /// Print a block by hash.
    pub fn print_block(&self, hash_hex: &str) -> Result<()> {
        let hash: Hash256 = hash_hex.parse()?;
        let header = self.relay.get_block_header(&hash)?;
        let height = self.relay.get_block_height(&hash)?;
        let status = self.relay.get_block_status(&hash)?;
        let work = self.relay.get_chain_work(&hash)?;

        println!("hash:           {}", hash);
        println!("height:         {}", height);
        println!("prev:           {}", header.prev_block_hash);
        println!("merkle root:    {}", header.merkle_root);
        println!("time:           {}", header.time);
        println!("bits:           {:#010x}", header.bits);
        println!("nonce:          {}", header.nonce);
        println!("canonical:      {}", status.is_canonical);
        println!("confirmations:  {}", status.confirmations);
        println!("chain work:     {:#x}", work);
        Ok(())
    }

    /// Print the canonical block at a height.
    pub fn print_block_at(&self, height: u64) -> Result<()> {
        let hash = self.relay.get_block_hash(height)?;
        self.print_block(&hash.to_string())
    }

    /// Check a Merkle proof against a canonical block.
    pub fn verify_tx(
        &self,
        block_hex: &str,
        txid_hex: &str,
        index: u64,
        proof_hex: &[String],
        confirmations: u64,
    ) -> Result<bool> {
        let block: Hash256 = block_hex.parse().context("Invalid block hash")?;
        let txid: Hash256 = txid_hex.parse().context("Invalid transaction id")?;
        let proof = proof_hex
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Hash256>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid proof hash")?;

        match self
            .relay
            .check_tx_inclusion(&proof, &block, &txid, index, confirmations)
        {
            Ok(included) => Ok(included),
            Err(ChainError::UnknownBlock(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Print the header locator.
    pub fn print_locator(&self) -> Result<()> {
        for hash in self.relay.get_header_locator()? {
            println!("{}", hash);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_consensus::{bits_to_target, BlockHeader, Network};
    use std::io::Write;
    use tempfile::TempDir;

    fn devnet_config(dir: &Path) -> NodeConfig {
        let mut config = NodeConfig::default_for_network(Network::Devnet);
        config.data_dir = dir.join("data");
        config.max_batch_size = 3;
        config
    }

    fn mine_chain(prev: BlockHeader, n: usize) -> Vec<BlockHeader> {
        let target = bits_to_target(prev.bits).unwrap();
        let mut out = Vec::new();
        let mut parent = prev;
        for _ in 0..n {
            let mut header = BlockHeader {
                version: 1,
                prev_block_hash: parent.block_hash(),
                merkle_root: Hash256::new([0x11; 32]),
                time: parent.time + 600,
                bits: parent.bits,
                nonce: 0,
            };
            while header.block_hash().to_biguint() > target {
                header.nonce += 1;
            }
            out.push(header);
            parent = header;
        }
        out
    }

    #[test]
    fn test_init_then_open() {
        let tmp = TempDir::new().unwrap();
        let config = devnet_config(tmp.path());
        {
            let node = Node::init(&config).unwrap();
            assert_eq!(node.relay().get_mainchain_height(), 0);
        }
        assert!(config.data_dir.join(SAVED_CONFIG_FILE).exists());

        let node = Node::open(&config).unwrap();
        assert_eq!(node.relay().get_mainchain_height(), 0);
        drop(node);

        // Already initialized
        assert!(Node::init(&config).is_err());
    }

    #[test]
    fn test_open_without_init_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(Node::open(&devnet_config(tmp.path())).is_err());
    }

    #[test]
    fn test_import_in_batches() {
        let tmp = TempDir::new().unwrap();
        let config = devnet_config(tmp.path());
        let node = Node::init(&config).unwrap();

        let (genesis, _) = ChainParams::devnet().genesis().unwrap();
        let headers = mine_chain(genesis, 7);

        let path = tmp.path().join("headers.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# devnet headers").unwrap();
        for header in &headers {
            writeln!(file, "{}", hex::encode(header.serialize())).unwrap();
        }
        drop(file);

        assert_eq!(node.import(&path).unwrap(), 7);
        assert_eq!(node.relay().get_mainchain_height(), 7);
        assert_eq!(node.relay().get_mainchain_head(), headers[6].block_hash());
    }

    #[test]
    fn test_submit_and_verify() {
        let tmp = TempDir::new().unwrap();
        let node = Node::init(&devnet_config(tmp.path())).unwrap();

        let (genesis, _) = ChainParams::devnet().genesis().unwrap();
        let headers = mine_chain(genesis, 2);
        for header in &headers {
            node.submit(&hex::encode(header.serialize())).unwrap();
        }

        // Single-transaction block: root equals the txid
        let block = headers[0].block_hash().to_string();
        let txid = Hash256::new([0x11; 32]).to_string();
        assert!(node.verify_tx(&block, &txid, 0, &[], 1).unwrap());
        assert!(!node.verify_tx(&block, &txid, 0, &[], 2).unwrap());

        let unknown = Hash256::new([0x22; 32]).to_string();
        assert!(!node.verify_tx(&unknown, &txid, 0, &[], 0).unwrap());
        assert!(node.submit("zz").is_err());
    }

    #[test]
    fn test_read_only_open_sees_committed_headers() {
        let tmp = TempDir::new().unwrap();
        let config = devnet_config(tmp.path());
        let node = Node::init(&config).unwrap();

        let (genesis, _) = ChainParams::devnet().genesis().unwrap();
        let headers = mine_chain(genesis, 4);
        for header in &headers {
            node.submit(&hex::encode(header.serialize())).unwrap();
        }
        drop(node);

        let reader = Node::open_read_only(&config).unwrap();
        assert_eq!(reader.relay().get_mainchain_height(), 4);
        assert_eq!(reader.relay().get_mainchain_head(), headers[3].block_hash());
        assert!(reader.relay().add_block_header(&[0u8; 80]).is_err());
    }
}
