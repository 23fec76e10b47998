//! Relay Node - command-line front end for the header relay.
//!
//! This is the main entry point for the relay-node binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// SPV header relay for Bitcoin-style proof-of-work chains.
#[derive(Parser, Debug)]
#[command(name = "relay-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay-node.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Network (mainnet, devnet)
    #[arg(short, long)]
    network: Option<String>,

    /// Maximum headers per batch
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Relay commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the data directory from genesis or the configured checkpoint
    Init,
    /// Submit one hex-encoded header
    Submit {
        /// 80-byte header as hex
        header: String,
    },
    /// Import hex headers from a file, one per line
    Import {
        /// File with one hex header per line
        file: PathBuf,
    },
    /// Print the best chain tip
    Status,
    /// Show a block by hash
    Block {
        /// Block hash (display order)
        hash: String,
    },
    /// Show the canonical block at a height
    BlockAt {
        /// Block height
        height: u64,
    },
    /// Verify a transaction Merkle proof against a canonical block
    VerifyTx {
        /// Block hash (display order)
        #[arg(long)]
        block: String,
        /// Transaction id (display order)
        #[arg(long)]
        txid: String,
        /// Position of the transaction in the block
        #[arg(long)]
        index: u64,
        /// Proof hashes, leaf level first, comma separated
        #[arg(long, value_delimiter = ',')]
        proof: Vec<String>,
        /// Required confirmations
        #[arg(long, default_value = "6")]
        confirmations: u64,
    },
    /// Print the header locator for syncing from peers
    Locator,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = NodeConfig::load(&args.config, &args)?;

    // Initialize logging
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Relay node v{}", env!("CARGO_PKG_VERSION"));
    info!("Network: {}", config.network);
    info!("Data directory: {:?}", config.data_dir);

    match args.command {
        Command::Init => {
            let node = Node::init(&config)?;
            node.print_status();
        }
        Command::Submit { header } => {
            let node = Node::open(&config)?;
            node.submit(&header)?;
        }
        Command::Import { file } => {
            let node = Node::open(&config)?;
            node.import(&file)?;
        }
        Command::Status => Node::open_read_only(&config)?.print_status(),
        Command::Block { hash } => Node::open_read_only(&config)?.print_block(&hash)?,
        Command::BlockAt { height } => Node::open_read_only(&config)?.print_block_at(height)?,
        Command::VerifyTx {
            block,
            txid,
            index,
            proof,
            confirmations,
        } => {
            let node = Node::open_read_only(&config)?;
            let included = node.verify_tx(&block, &txid, index, &proof, confirmations)?;
            println!("{}", if included { "included" } else { "not included" });
        }
        Command::Locator => Node::open_read_only(&config)?.print_locator()?,
    }

    Ok(())
}
