//! # relay-tests
//!
//! Integration tests for the header relay.
//!
//! This crate provides:
//! - A harness that wires a relay to RocksDB or in-memory storage
//! - Generators that mine devnet headers and build Merkle trees
//! - Scenario tests for extension, reorgs, retargets and batches
//! - Property-based tests for the consensus primitives

pub mod generators;
pub mod harness;


#[cfg(test)]
mod reorg_tests;

#[cfg(test)]
mod retarget_tests;





pub use generators::*;
pub use harness::*;
