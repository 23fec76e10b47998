//! # relay-chain
//!
//! Best-chain tracking for a proof-of-work header relay.
//!
//! This crate provides:
//! - `ChainStore`: header records, per-block chain work, the canonical height
//!   index and the chain tip, over any `Storage` backend
//! - `ChainExtender`: validation of a header against its stored parent
//! - `ForkResolver`: greatest-work chain selection and index rewrites
//! - `HeaderRelay`: the facade callers submit headers to and query
//!
//! ## Architecture
//!
//! Headers enter through `HeaderRelay`, which holds the tip behind a
//! read/write lock. Each accepted header is committed as one atomic write
//! batch, so readers never observe a half-applied reorganization.

mod error;
mod extender;
mod fork;
mod relay;
mod store;

pub use error::{ChainError, ChainResult};
pub use extender::{ChainExtender, ValidatedHeader};
pub use fork::{ChainSelection, ForkResolver};
pub use relay::{BlockStatus, HeadListener, HeaderRelay, RelayConfig, DEFAULT_MAX_BATCH_SIZE};
pub use store::{BlockRecord, ChainStore, ChainTip};

use relay_storage::ColumnFamily;

/// Chain-related column families.
pub mod columns {
    use super::ColumnFamily;

    /// Header records keyed by block hash.
    pub const HEADERS: ColumnFamily = ColumnFamily::Headers;
    /// Cumulative chain work keyed by block hash.
    pub const CHAIN_WORK: ColumnFamily = ColumnFamily::ChainWork;
    /// Canonical chain (height -> block hash).
    pub const HEADER_CHAIN: ColumnFamily = ColumnFamily::HeaderChain;
    /// Tip and checkpoint metadata.
    pub const METADATA: ColumnFamily = ColumnFamily::Metadata;
}
