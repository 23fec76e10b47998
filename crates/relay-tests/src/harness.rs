//! Test harness for integration tests.
//!
//! Provides temporary databases and relays that are ready to take headers.

use parking_lot::Mutex;
use relay_chain::{ChainResult, ChainSelection, HeadListener, HeaderRelay, RelayConfig};
use relay_consensus::{BlockHeader, ChainParams, Hash256};
use relay_storage::{Database, MemoryDatabase, Storage};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A RocksDB database in a temporary directory.
///
/// The directory is removed when this is dropped.
pub struct TestDatabase {
    db: Database,
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self::open_in(temp_dir)
    }

    /// Open a database in an existing directory.
    pub fn open_in(temp_dir: TempDir) -> Self {
        let db = Database::open(temp_dir.path()).expect("Failed to open database");
        Self { db, temp_dir }
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get a clone of the database handle.
    pub fn db_clone(&self) -> Database {
        self.db.clone()
    }

    /// Close the database, keeping its directory.
    pub fn close(self) -> TempDir {
        let Self { db, temp_dir } = self;
        drop(db);
        temp_dir
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Storage backend for a [`TestRelay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory maps.
    Memory,
    /// RocksDB in a temporary directory.
    RocksDb,
}

/// A relay over fresh storage.
pub struct TestRelay {
    relay: HeaderRelay,
    storage: Arc<dyn Storage>,
    dir: Option<TempDir>,
    params: ChainParams,
    config: RelayConfig,
}

impl TestRelay {
    /// Devnet relay from genesis over in-memory storage.
    pub fn devnet() -> Self {
        Self::genesis(ChainParams::devnet(), Backend::Memory, RelayConfig::default())
    }

    /// Devnet relay from genesis over RocksDB.
    pub fn devnet_on_disk() -> Self {
        Self::genesis(ChainParams::devnet(), Backend::RocksDb, RelayConfig::default())
    }

    /// Mainnet relay from genesis over in-memory storage.
    pub fn mainnet() -> Self {
        Self::genesis(ChainParams::mainnet(), Backend::Memory, RelayConfig::default())
    }

    /// Relay initialized from the network's genesis header.
    pub fn genesis(params: ChainParams, backend: Backend, config: RelayConfig) -> Self {
        let (storage, dir) = open_backend(backend);
        let relay = HeaderRelay::init_genesis(storage.clone(), params.clone(), config.clone())
            .expect("Failed to initialize relay");
        Self {
            relay,
            storage,
            dir,
            params,
            config,
        }
    }

    /// Devnet relay initialized from a trusted checkpoint.
    pub fn devnet_checkpoint(
        header: &BlockHeader,
        height: u64,
        chain_work: num_bigint::BigUint,
    ) -> ChainResult<Self> {
        let params = ChainParams::devnet();
        let config = RelayConfig::default();
        let (storage, dir) = open_backend(Backend::Memory);
        let relay = HeaderRelay::init_checkpoint(
            storage.clone(),
            params.clone(),
            config.clone(),
            &header.serialize(),
            height,
            chain_work,
        )?;
        Ok(Self {
            relay,
            storage,
            dir,
            params,
            config,
        })
    }

    /// Drop the relay and load it again from the same storage.
    pub fn reopen(self) -> Self {
        let Self {
            relay,
            storage,
            dir,
            params,
            config,
        } = self;
        drop(relay);

        let storage: Arc<dyn Storage> = match dir {
            Some(ref dir) => {
                drop(storage);
                Arc::new(Database::open(dir.path()).expect("Failed to reopen database"))
            }
            None => storage,
        };
        let relay = HeaderRelay::open(storage.clone(), params.clone(), config.clone())
            .expect("Failed to reopen relay");

        Self {
            relay,
            storage,
            dir,
            params,
            config,
        }
    }

    /// Storage the relay writes to.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Network parameters.
    pub fn chain_params(&self) -> &ChainParams {
        &self.params
    }

    /// Submit one header.
    pub fn submit(&self, header: &BlockHeader) -> ChainResult<ChainSelection> {
        self.relay.add_block_header(&header.serialize())
    }

    /// Submit headers one call at a time, stopping at the first error.
    pub fn submit_each(&self, headers: &[BlockHeader]) -> ChainResult<Vec<ChainSelection>> {
        headers.iter().map(|header| self.submit(header)).collect()
    }

    /// Submit headers as one batch call.
    pub fn submit_batch(&self, headers: &[BlockHeader]) -> ChainResult<Vec<ChainSelection>> {
        let raws: Vec<[u8; 80]> = headers.iter().map(BlockHeader::serialize).collect();
        self.relay.add_block_header_batch(&raws)
    }
}

impl Deref for TestRelay {
    type Target = HeaderRelay;

    fn deref(&self) -> &Self::Target {
        &self.relay
    }
}

fn open_backend(backend: Backend) -> (Arc<dyn Storage>, Option<TempDir>) {
    match backend {
        Backend::Memory => (Arc::new(MemoryDatabase::new()), None),
        Backend::RocksDb => {
            let dir = TempDir::new().expect("Failed to create temp dir");
            let db = Database::open(dir.path()).expect("Failed to open database");
            (Arc::new(db), Some(dir))
        }
    }
}

/// Records every head notification.
#[derive(Default)]
pub struct HeadRecorder {
    events: Mutex<Vec<(Hash256, u64)>>,
}

impl HeadRecorder {
    /// Create a recorder ready to register.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Notifications received so far.
    pub fn events(&self) -> Vec<(Hash256, u64)> {
        self.events.lock().clone()
    }
}

impl HeadListener for HeadRecorder {
    fn on_head_updated(&self, head: &Hash256, height: u64) {
        self.events.lock().push((*head, height));
    }
}
