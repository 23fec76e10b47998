//! Fork choice and reorganization tests.
//!
//! These tests verify that:
//! - The branch with strictly more work becomes canonical
//! - Equal work keeps the chain seen first
//! - The height index is rewritten on reorg, including moves to a lower height

use crate::generators::*;
use crate::harness::*;
use relay_chain::{ChainError, ChainSelection};

#[test]
fn test_heavier_sibling_takes_over() {
    let relay = TestRelay::devnet();
    let base = ChainBuilder::new(relay.chain_params());

    let mut main = base.fork(0, 1);
    let b = main.mine_next(600);
    let mut side = base.fork(0, 2);
    let b_prime = side.mine_many(2, 600);

    assert_eq!(relay.submit(&b).unwrap(), ChainSelection::Extended);
    assert_eq!(relay.submit(&b_prime[0]).unwrap(), ChainSelection::Ignored);
    assert_eq!(relay.get_mainchain_head(), b.block_hash());

    assert_eq!(
        relay.submit(&b_prime[1]).unwrap(),
        ChainSelection::Reorg {
            fork_height: 0,
            rollback_count: 1,
        }
    );
    assert_eq!(relay.get_mainchain_head(), b_prime[1].block_hash());
    assert_eq!(relay.get_mainchain_height(), 2);
    assert_eq!(relay.get_block_hash(1).unwrap(), b_prime[0].block_hash());

    let status = relay.get_block_status(&b.block_hash()).unwrap();
    assert!(!status.is_canonical);
    assert_eq!(status.confirmations, 0);
    assert!(relay.block_exists(&b.block_hash()).unwrap());
}

#[test]
fn test_equal_work_keeps_first_seen() {
    let relay = TestRelay::devnet();
    let base = ChainBuilder::new(relay.chain_params());
    let first = base.fork(0, 1).mine_many(3, 600);
    let second = base.fork(0, 2).mine_many(3, 600);

    relay.submit_each(&first).unwrap();
    for header in &second {
        assert_eq!(relay.submit(header).unwrap(), ChainSelection::Ignored);
    }

    assert_eq!(relay.get_mainchain_head(), first[2].block_hash());
    for (height, header) in (1..).zip(&first) {
        assert_eq!(relay.get_block_hash(height).unwrap(), header.block_hash());
    }
}

#[test]
fn test_heavier_branch_wins_in_any_order() {
    let base = ChainBuilder::new(&relay_consensus::ChainParams::devnet());
    let mut trunk = base.fork(0, 1);
    trunk.mine_many(3, 600);
    let short = trunk.fork(3, 2).mine_many(2, 600);
    let long = trunk.fork(3, 3).mine_many(4, 600);

    for order in [[&short, &long], [&long, &short]] {
        let relay = TestRelay::devnet();
        relay.submit_each(trunk.since(1)).unwrap();
        relay.submit_each(order[0]).unwrap();
        relay.submit_each(order[1]).unwrap();

        assert_eq!(relay.get_mainchain_head(), long[3].block_hash());
        assert_eq!(relay.get_mainchain_height(), 7);
        for (height, header) in (4..).zip(&long) {
            assert_eq!(relay.get_block_hash(height).unwrap(), header.block_hash());
        }
        for header in &short {
            assert!(!relay.is_in_mainchain(&header.block_hash()).unwrap());
        }
    }
}

#[test]
fn test_reorg_reports_fork_point() {
    let relay = TestRelay::devnet();
    let mut main = ChainBuilder::new(relay.chain_params()).tagged(1);
    relay.submit_each(&main.mine_many(10, 600)).unwrap();

    let mut side = main.fork(6, 2);
    let side_headers = side.mine_many(5, 600);
    let selections = relay.submit_each(&side_headers).unwrap();

    assert_eq!(
        selections,
        vec![
            ChainSelection::Ignored,
            ChainSelection::Ignored,
            ChainSelection::Ignored,
            ChainSelection::Ignored,
            ChainSelection::Reorg {
                fork_height: 6,
                rollback_count: 4,
            },
        ]
    );
    assert_eq!(relay.get_mainchain_height(), 11);
    for height in 0..=6 {
        assert_eq!(relay.get_block_hash(height).unwrap(), main.hash_at(height));
    }
    for height in 7..=11 {
        assert_eq!(relay.get_block_hash(height).unwrap(), side.hash_at(height));
    }
}

#[test]
fn test_reorg_notifies_once_per_call() {
    let relay = TestRelay::devnet();
    let recorder = HeadRecorder::new();
    relay.add_listener(recorder.clone());

    let mut main = ChainBuilder::new(relay.chain_params()).tagged(1);
    relay.submit_each(&main.mine_many(2, 600)).unwrap();
    assert_eq!(recorder.events().len(), 2);

    let mut side = main.fork(0, 2);
    let side_headers = side.mine_many(3, 600);
    relay.submit_batch(&side_headers[..2]).unwrap();
    assert_eq!(recorder.events().len(), 2, "equal work must not notify");

    relay.submit(&side_headers[2]).unwrap();
    assert_eq!(
        recorder.events().last().copied(),
        Some((side.tip_hash(), 3))
    );
    assert_eq!(recorder.events().len(), 3);
}

/// A shorter branch that retargets to a harder difficulty overtakes a longer
/// branch at the easiest difficulty, and the index above its head is removed.
#[test]
fn test_reorg_to_lower_height_clears_index() {
    let relay = TestRelay::devnet();
    let mut trunk = ChainBuilder::new(relay.chain_params()).tagged(1);
    relay.submit_each(&trunk.mine_many(100, 700)).unwrap();

    // Slow epoch: retarget caps at the limit, bits stay unchanged
    let mut light = trunk.fork(100, 2);
    relay.submit_each(&light.mine_many(1921, 700)).unwrap();
    assert_eq!(relay.get_mainchain_height(), 2021);
    assert_eq!(light.at(2016).bits, light.at(2015).bits);

    // Fast epoch: retarget clamps to a quarter of the target
    let mut heavy = trunk.fork(100, 3);
    for header in heavy.mine_many(1915, 1) {
        assert_eq!(relay.submit(&header).unwrap(), ChainSelection::Ignored);
    }
    assert_ne!(heavy.next_bits(), light.at(2016).bits);

    let selection = loop {
        let header = heavy.mine_next(1);
        match relay.submit(&header).unwrap() {
            ChainSelection::Ignored => assert!(heavy.height() < 2021),
            other => break other,
        }
    };

    // 2021 blocks of work 2 lose to 2015 of work 2 plus two of work 8
    let new_height = heavy.height();
    assert_eq!(new_height, 2017);
    assert_eq!(
        selection,
        ChainSelection::Reorg {
            fork_height: 100,
            rollback_count: 1921,
        }
    );
    assert_eq!(relay.get_mainchain_height(), new_height);
    assert_eq!(relay.get_block_hash(new_height).unwrap(), heavy.tip_hash());
    for height in (new_height + 1)..=2021 {
        assert!(matches!(
            relay.get_block_hash(height),
            Err(ChainError::HeightNotIndexed(h)) if h == height
        ));
    }
    assert_eq!(
        relay.last_epoch_cumulative_work(),
        relay.get_chain_work(&heavy.hash_at(2015)).unwrap()
    );
}
