//! Difficulty retarget tests.
//!
//! These tests verify that:
//! - Headers at an epoch boundary must carry the clamped, capped retarget
//! - The last epoch's cumulative work is folded in at each boundary
//! - Checkpoint initialization anchors later retargets

use crate::generators::*;
use crate::harness::*;
use num_bigint::BigUint;
use relay_chain::{ChainError, ChainSelection};
use relay_consensus::{
    bits_to_target, target_to_bits, BlockHeader, ChainParams, ConsensusError, Hash256,
};

/// Genesis plus a full epoch mined one second apart.
fn fast_epoch() -> (TestRelay, ChainBuilder) {
    let relay = TestRelay::devnet();
    let mut chain = ChainBuilder::new(relay.chain_params());
    relay.submit_batch(&chain.mine_many(2015, 1)).unwrap();
    (relay, chain)
}

#[test]
fn test_boundary_requires_clamped_retarget() {
    let (relay, mut chain) = fast_epoch();
    assert_eq!(relay.get_mainchain_height(), 2015);
    assert_eq!(relay.last_epoch_cumulative_work(), BigUint::from(0u32));

    let old_bits = chain.tip().bits;
    let time = chain.tip().time + 1;

    // Keeping the old difficulty is rejected
    let mut stale = chain.template(time);
    stale.bits = old_bits;
    let expected = chain.next_bits();
    assert!(matches!(
        relay.submit(&stale),
        Err(ChainError::Consensus(ConsensusError::InvalidTarget { height: 2016, got, expected: e }))
            if got == old_bits && e == expected
    ));

    // So is the unclamped adjustment
    let elapsed = chain.tip().time - chain.at(0).time;
    let unclamped = bits_to_target(old_bits).unwrap() * BigUint::from(elapsed)
        / BigUint::from(relay.chain_params().target_timespan_secs());
    let mut unclamped_header = chain.template(time);
    unclamped_header.bits = target_to_bits(&unclamped);
    assert_ne!(unclamped_header.bits, expected);
    assert!(matches!(
        relay.submit(&unclamped_header),
        Err(ChainError::Consensus(ConsensusError::InvalidTarget { height: 2016, .. }))
    ));

    // A quarter of the old target is accepted
    let quarter = bits_to_target(old_bits).unwrap() / 4u32;
    assert_eq!(expected, target_to_bits(&quarter));
    let header = chain.mine_next(1);
    assert_eq!(relay.submit(&header).unwrap(), ChainSelection::Extended);
    assert_eq!(relay.get_mainchain_height(), 2016);
    assert_eq!(
        relay.last_epoch_cumulative_work(),
        relay.get_chain_work(&chain.hash_at(2015)).unwrap()
    );

    // Later headers in the epoch keep the new bits
    let next = chain.mine_next(1);
    assert_eq!(next.bits, expected);
    relay.submit(&next).unwrap();
}

#[test]
fn test_slow_epoch_capped_at_limit() {
    let relay = TestRelay::devnet();
    let mut chain = ChainBuilder::new(relay.chain_params());
    relay.submit_batch(&chain.mine_many(2015, 1200)).unwrap();

    // Twice the timespan would double the target, past the limit
    assert_eq!(chain.next_bits(), relay.chain_params().pow_limit_bits);
    let header = chain.mine_next(1200);
    assert_eq!(relay.submit(&header).unwrap(), ChainSelection::Extended);
}

#[test]
fn test_boundary_inside_batch() {
    let relay = TestRelay::devnet();
    let mut chain = ChainBuilder::new(relay.chain_params());
    relay.submit_batch(&chain.mine_many(2010, 1)).unwrap();

    let tail = chain.mine_many(10, 1);
    assert_eq!(relay.submit_batch(&tail).unwrap().len(), 10);
    assert_eq!(relay.get_mainchain_height(), 2020);
    assert_ne!(chain.at(2016).bits, chain.at(2015).bits);
    assert_eq!(
        relay.last_epoch_cumulative_work(),
        relay.get_chain_work(&chain.hash_at(2015)).unwrap()
    );
}

/// A mined devnet header used as a trusted checkpoint.
fn checkpoint_header() -> BlockHeader {
    let params = ChainParams::devnet();
    let (genesis, _) = params.genesis().unwrap();
    mine(BlockHeader {
        version: 1,
        prev_block_hash: Hash256::new([0xcc; 32]),
        merkle_root: Hash256::new([0xcd; 32]),
        time: genesis.time + 2016 * 600,
        bits: params.pow_limit_bits,
        nonce: 0,
    })
}

#[test]
fn test_checkpoint_initialization() {
    let header = checkpoint_header();
    let relay = TestRelay::devnet_checkpoint(&header, 2016, BigUint::from(10_000u32)).unwrap();

    assert_eq!(relay.get_mainchain_head(), header.block_hash());
    assert_eq!(relay.get_mainchain_height(), 2016);
    assert_eq!(relay.checkpoint_height(), 2016);
    // Supplied work minus the checkpoint's own work of 2
    assert_eq!(relay.last_epoch_cumulative_work(), BigUint::from(9_998u32));
    assert!(matches!(
        relay.get_block_hash(2015),
        Err(ChainError::HeightNotIndexed(2015))
    ));

    let mut chain = ChainBuilder::from_header(relay.chain_params(), header, 2016);
    relay.submit_each(&chain.mine_many(5, 600)).unwrap();
    assert_eq!(relay.get_mainchain_height(), 2021);
    assert_eq!(
        relay.get_chain_work(&chain.tip_hash()).unwrap(),
        BigUint::from(10_010u32)
    );
    assert_eq!(relay.get_header_locator().unwrap().last(), Some(&header.block_hash()));
}

#[test]
fn test_checkpoint_anchors_next_retarget() {
    let header = checkpoint_header();
    let relay = TestRelay::devnet_checkpoint(&header, 2016, BigUint::from(4_034u32)).unwrap();

    let mut chain = ChainBuilder::from_header(relay.chain_params(), header, 2016);
    relay.submit_batch(&chain.mine_many(2015, 1)).unwrap();

    let boundary = chain.mine_next(1);
    assert_ne!(boundary.bits, header.bits);
    assert_eq!(relay.submit(&boundary).unwrap(), ChainSelection::Extended);
    assert_eq!(relay.get_mainchain_height(), 4032);
    assert_eq!(
        relay.last_epoch_cumulative_work(),
        relay.get_chain_work(&chain.hash_at(4031)).unwrap()
    );
}

#[test]
fn test_checkpoint_must_be_boundary() {
    let header = checkpoint_header();
    assert!(matches!(
        TestRelay::devnet_checkpoint(&header, 2017, BigUint::from(1u32)),
        Err(ChainError::InvalidInitialBlockHeight(2017))
    ));
}

#[test]
fn test_checkpoint_bits_must_decode() {
    let mut header = checkpoint_header();
    header.bits = 0x04923456;
    assert!(matches!(
        TestRelay::devnet_checkpoint(&header, 2016, BigUint::from(1u32)),
        Err(ChainError::Consensus(ConsensusError::InvalidDifficultyBits(0x04923456)))
    ));
}
