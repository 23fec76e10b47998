//! RocksDB backend.

use crate::batch::OperationKind;
use crate::{Storage, StorageError, StorageResult, WriteBatch};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode, IteratorMode,
    MultiThreaded, Options,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Tables of the header store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnFamily {
    /// Raw headers plus height, indexed by block hash.
    Headers,
    /// Block hash -> cumulative chain work (big-endian bytes).
    ChainWork,
    /// Canonical chain mapping (height -> block hash).
    HeaderChain,
    /// Chain tip and initialization metadata.
    Metadata,
    /// RocksDB's implicit default family, unused by the relay.
    Default,
}

impl ColumnFamily {
    /// On-disk column family name.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Headers => "headers",
            ColumnFamily::ChainWork => "chain_work",
            ColumnFamily::HeaderChain => "header_chain",
            ColumnFamily::Metadata => "metadata",
            ColumnFamily::Default => "default",
        }
    }

    /// Every family, in the order they are opened.
    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::Headers,
            ColumnFamily::ChainWork,
            ColumnFamily::HeaderChain,
            ColumnFamily::Metadata,
            ColumnFamily::Default,
        ]
    }
}

type Rocks = DBWithThreadMode<MultiThreaded>;

/// Options for one column family.
///
/// Header records and chain work are read by hash on every submission, so
/// those tables are tuned for point lookups. Metadata is a handful of small
/// keys and stays uncompressed.
fn cf_options(cf: ColumnFamily) -> Options {
    let mut opts = Options::default();
    match cf {
        ColumnFamily::Headers | ColumnFamily::ChainWork => {
            opts.set_compression_type(DBCompressionType::Lz4);
            opts.optimize_for_point_lookup(POINT_LOOKUP_CACHE_MB);
        }
        ColumnFamily::HeaderChain => {
            opts.set_compression_type(DBCompressionType::Lz4);
        }
        ColumnFamily::Metadata | ColumnFamily::Default => {
            opts.set_compression_type(DBCompressionType::None);
        }
    }
    opts
}

/// Block cache for the point-lookup tables, in megabytes.
const POINT_LOOKUP_CACHE_MB: u64 = 32;
const MAX_OPEN_FILES: i32 = 256;
const MAX_WAL_BYTES: u64 = 64 * 1024 * 1024;

/// RocksDB-backed store with one column family per [`ColumnFamily`].
///
/// Clones share the same underlying handle.
#[derive(Clone)]
pub struct Database {
    db: Arc<RwLock<Rocks>>,
    read_only: bool,
}

impl Database {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!(?path, "Opening header database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(MAX_OPEN_FILES);
        opts.set_keep_log_file_num(1);
        opts.set_max_total_wal_size(MAX_WAL_BYTES);

        let descriptors = ColumnFamily::all()
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name(), cf_options(*cf)));
        let db = Rocks::open_cf_descriptors(&opts, path, descriptors)?;

        debug!(column_families = ColumnFamily::all().len(), "Header database ready");
        Ok(Self::wrap(db, false))
    }

    /// Open an existing database for reads only.
    ///
    /// Another process may hold the database open for writing.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!(?path, "Opening header database read-only");

        let names = ColumnFamily::all().iter().map(|cf| cf.name());
        let db = Rocks::open_cf_for_read_only(&Options::default(), path, names, false)?;
        Ok(Self::wrap(db, true))
    }

    fn wrap(db: Rocks, read_only: bool) -> Self {
        Self {
            db: Arc::new(RwLock::new(db)),
            read_only,
        }
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self, cf: ColumnFamily) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(cf.name()));
        }
        Ok(())
    }
}

fn handle(db: &Rocks, cf: ColumnFamily) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
    db.cf_handle(cf.name())
        .ok_or(StorageError::ColumnFamilyNotFound(cf.name()))
}

impl Storage for Database {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let db = self.db.read();
        Ok(db.get_cf(&handle(&db, cf)?, key)?)
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.check_writable(cf)?;
        let db = self.db.read();
        db.put_cf(&handle(&db, cf)?, key, value)?;
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        self.check_writable(cf)?;
        let db = self.db.read();
        db.delete_cf(&handle(&db, cf)?, key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let db = self.db.read();
        let mut rocks_batch = rocksdb::WriteBatch::default();

        for op in batch.operations {
            self.check_writable(op.cf)?;
            let cf = handle(&db, op.cf)?;
            match op.kind {
                OperationKind::Put { value } => rocks_batch.put_cf(&cf, &op.key, &value),
                OperationKind::Delete => rocks_batch.delete_cf(&cf, &op.key),
            }
        }

        db.write(rocks_batch)?;
        Ok(())
    }

    fn iter(
        &self,
        cf: ColumnFamily,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let db = self.db.read();
        // Collected eagerly: the iterator cannot outlive the read guard.
        let entries = db
            .iterator_cf(&handle(&db, cf)?, IteratorMode::Start)
            .map(|entry| entry.map(|(k, v)| (k.into_vec(), v.into_vec())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(entries.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();
        (tmp, db)
    }

    #[test]
    fn test_record_put_and_delete() {
        let (_tmp, db) = open_temp();
        let hash = [0xab; 32];

        db.put(ColumnFamily::Headers, &hash, &[1u8; 88]).unwrap();
        assert!(db.contains(ColumnFamily::Headers, &hash).unwrap());
        assert!(!db.contains(ColumnFamily::ChainWork, &hash).unwrap());

        db.delete(ColumnFamily::Headers, &hash).unwrap();
        assert_eq!(db.get(ColumnFamily::Headers, &hash).unwrap(), None);
    }

    #[test]
    fn test_batch_spans_column_families() {
        let (_tmp, db) = open_temp();
        db.put(ColumnFamily::HeaderChain, &9u64.to_be_bytes(), b"stale")
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Headers, [0x01; 32], vec![0u8; 88]);
        batch.put(ColumnFamily::ChainWork, [0x01; 32], vec![0x02]);
        batch.put(ColumnFamily::HeaderChain, 8u64.to_be_bytes(), [0x01; 32]);
        batch.delete(ColumnFamily::HeaderChain, 9u64.to_be_bytes());
        db.write_batch(batch).unwrap();

        assert_eq!(
            db.get(ColumnFamily::ChainWork, &[0x01; 32]).unwrap(),
            Some(vec![0x02])
        );
        assert_eq!(
            db.get(ColumnFamily::HeaderChain, &8u64.to_be_bytes()).unwrap(),
            Some(vec![0x01; 32])
        );
        assert_eq!(
            db.get(ColumnFamily::HeaderChain, &9u64.to_be_bytes()).unwrap(),
            None
        );
    }

    #[test]
    fn test_height_index_iterates_in_order() {
        let (_tmp, db) = open_temp();
        for height in [300u64, 1, 256] {
            db.put(ColumnFamily::HeaderChain, &height.to_be_bytes(), &[0u8; 32])
                .unwrap();
        }

        let heights: Vec<u64> = db
            .iter(ColumnFamily::HeaderChain)
            .unwrap()
            .map(|(k, _)| u64::from_be_bytes(k.try_into().unwrap()))
            .collect();
        assert_eq!(heights, vec![1, 256, 300]);
    }

    #[test]
    fn test_clones_share_handle() {
        let (_tmp, db) = open_temp();
        let other = db.clone();
        other.put(ColumnFamily::Metadata, b"best_height", b"1").unwrap();
        assert!(db.contains(ColumnFamily::Metadata, b"best_height").unwrap());
        assert!(!db.is_read_only());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let tmp = TempDir::new().unwrap();
        {
            let db = Database::open(tmp.path()).unwrap();
            db.put(ColumnFamily::Metadata, b"best_height", &7u64.to_be_bytes())
                .unwrap();
        }

        let db = Database::open_read_only(tmp.path()).unwrap();
        assert!(db.is_read_only());
        assert_eq!(
            db.get(ColumnFamily::Metadata, b"best_height").unwrap(),
            Some(7u64.to_be_bytes().to_vec())
        );
        assert!(matches!(
            db.put(ColumnFamily::Metadata, b"best_height", b"x"),
            Err(StorageError::ReadOnly("metadata"))
        ));

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::HeaderChain, 0u64.to_be_bytes());
        assert!(matches!(
            db.write_batch(batch),
            Err(StorageError::ReadOnly("header_chain"))
        ));
    }
}
