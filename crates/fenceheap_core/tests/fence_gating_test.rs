//! # Fence Gating Verification
//!
//! Drives both managers through long, seeded sequences of
//! allocate / discard / release and checks after every step that:
//!
//! 1. **Partition**: outstanding, stale and free ranges tile the region
//! 2. **No premature reuse**: nothing is handed out over a stale block
//! 3. **Idempotence**: repeating a release changes nothing
//!
//! Run with: cargo test --test fence_gating_test

use std::collections::VecDeque;
use std::ops::Range;

use fenceheap_core::{
    BackingRegion, FreeListManager, MasterBlock, MasterBlockManager, RingBufferManager,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const REGION_SIZE: u64 = 64 * 1024;
const STEPS: usize = 5_000;

fn overlaps(a: &Range<u64>, b: &Range<u64>) -> bool {
    a.start < b.end && b.start < a.end
}

fn random_alignment(rng: &mut ChaCha8Rng) -> u64 {
    1u64 << rng.gen_range(0..9u32)
}

/// Test-side record of every block the manager has not retired yet.
#[derive(Default)]
struct Model {
    outstanding: Vec<MasterBlock>,
    /// Reserved ranges of discarded blocks with their fence, oldest first.
    stale: VecDeque<(Range<u64>, u64)>,
}

impl Model {
    fn assert_not_stale(&self, block: &MasterBlock) {
        for (range, fence) in &self.stale {
            assert!(
                !overlaps(&block.range(), range),
                "block {:?} reuses {:?} before fence {} completed",
                block.range(),
                range,
                fence
            );
        }
    }

    fn retire(&mut self, completed: u64) {
        while self.stale.front().is_some_and(|(_, fence)| *fence <= completed) {
            self.stale.pop_front();
        }
    }
}

// ============================================================================
// FREE LIST
// ============================================================================

fn assert_free_list_partition(mgr: &FreeListManager, model: &Model) {
    mgr.validate().unwrap();

    let mut ranges: Vec<Range<u64>> = mgr.free_ranges();
    ranges.extend(model.outstanding.iter().map(MasterBlock::reserved_range));
    ranges.extend(model.stale.iter().map(|(range, _)| range.clone()));
    ranges.sort_by_key(|range| range.start);

    let mut cursor = 0;
    for range in &ranges {
        assert_eq!(range.start, cursor, "gap or overlap at {cursor}: {ranges:?}");
        cursor = range.end;
    }
    assert_eq!(cursor, REGION_SIZE);

    let held: u64 = model
        .outstanding
        .iter()
        .map(|block| block.reserved_range().end - block.reserved_range().start)
        .chain(model.stale.iter().map(|(range, _)| range.end - range.start))
        .sum();
    assert_eq!(mgr.used_size(), held);
}

#[test]
fn verify_free_list_partition_and_fence_gating() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x00f3_4ce5);
    let mgr = FreeListManager::new(BackingRegion::new(REGION_SIZE));
    let mut model = Model::default();
    let mut fence = 0u64;
    let mut completed = 0u64;

    for _ in 0..STEPS {
        match rng.gen_range(0..10) {
            0..=4 => {
                let size = rng.gen_range(1..2048);
                let alignment = random_alignment(&mut rng);
                if let Ok(block) = mgr.allocate_master_block(size, alignment) {
                    assert_eq!(block.offset() % alignment, 0);
                    assert!(block.range().end <= REGION_SIZE);
                    model.assert_not_stale(&block);
                    model.outstanding.push(block);
                }
            }
            5..=7 => {
                // Discard a random subset as one submitted frame.
                fence += 1;
                let mut discarded = Vec::new();
                let mut index = 0;
                while index < model.outstanding.len() {
                    if rng.gen_bool(0.5) {
                        discarded.push(model.outstanding.swap_remove(index));
                    } else {
                        index += 1;
                    }
                }
                for block in &discarded {
                    model.stale.push_back((block.reserved_range(), fence));
                }
                mgr.discard_master_blocks(&mut discarded, fence);
                assert!(discarded.is_empty());
            }
            _ => {
                // The GPU lags a few frames behind.
                completed = completed.max(fence.saturating_sub(rng.gen_range(0..4)));
                let before = mgr.stats();
                mgr.release_stale_blocks(completed);
                model.retire(completed);

                assert_eq!(mgr.release_stale_blocks(completed), 0);
                assert!(mgr.stats().retired_units >= before.retired_units);
            }
        }
        assert_free_list_partition(&mgr, &model);
    }
}

#[test]
fn verify_free_list_fifo_retirement_scenario() {
    let mgr = FreeListManager::new(BackingRegion::new(1024));
    let a = mgr.allocate_master_block(100, 16).unwrap();
    let b = mgr.allocate_master_block(100, 16).unwrap();
    let a_range = a.range();
    let b_range = b.range();

    mgr.discard_master_blocks(&mut vec![a], 1);
    mgr.discard_master_blocks(&mut vec![b], 2);

    // Nothing completed yet.
    assert_eq!(mgr.release_stale_blocks(0), 0);
    assert_eq!(mgr.stale_block_count(), 2);

    // Fence 1 frees A only; A merges with nothing because B is still pending.
    assert_eq!(mgr.release_stale_blocks(1), 1);
    assert_eq!(mgr.free_ranges(), vec![0..100, 212..1024]);

    let c = mgr.allocate_master_block(100, 16).unwrap();
    assert_eq!(c.range(), a_range);
    assert!(!overlaps(&c.range(), &b_range));

    assert_eq!(mgr.release_stale_blocks(2), 1);
    mgr.discard_master_blocks(&mut vec![c], 3);
    mgr.release_stale_blocks(3);
    assert_eq!(mgr.free_ranges(), vec![0..1024]);
}

// ============================================================================
// RING BUFFER
// ============================================================================

/// Test-side mirror of the ring's cursor and per-frame charges.
#[derive(Default)]
struct RingModel {
    /// Where the next allocation starts unless it wraps.
    cursor: u64,
    /// Units charged to the frame being recorded.
    current: u64,
    /// Units charged to each submitted frame with its fence, oldest first.
    frames: VecDeque<(u64, u64)>,
}

impl RingModel {
    /// Charges `block` to the current frame, including a skipped tail when
    /// the block wrapped to offset 0.
    fn record(&mut self, block: &MasterBlock) {
        let reserved = block.reserved_range();
        if reserved.start != self.cursor {
            assert_eq!(reserved.start, 0, "ring block neither follows the tail nor wraps");
            self.current += REGION_SIZE - self.cursor;
        }
        self.current += reserved.end - reserved.start;
        self.cursor = reserved.end;
    }

    fn submit(&mut self, fence: u64) {
        self.frames.push_back((std::mem::take(&mut self.current), fence));
    }

    fn retire(&mut self, completed: u64) {
        while self.frames.front().is_some_and(|(_, fence)| *fence <= completed) {
            self.frames.pop_front();
        }
        if self.used() == 0 {
            self.cursor = 0;
        }
    }

    fn used(&self) -> u64 {
        self.current + self.frames.iter().map(|(units, _)| units).sum::<u64>()
    }
}

#[test]
fn verify_ring_fence_gating() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x0051_e6e6);
    let mgr = RingBufferManager::new(BackingRegion::new(REGION_SIZE));
    let mut model = Model::default();
    let mut ring = RingModel::default();
    let mut fence = 0u64;
    let mut completed = 0u64;

    for _ in 0..STEPS {
        if rng.gen_bool(0.6) {
            let size = rng.gen_range(1..4096);
            let alignment = random_alignment(&mut rng);
            if let Ok(block) = mgr.allocate_master_block(size, alignment) {
                assert_eq!(block.offset() % alignment, 0);
                assert!(block.range().end <= REGION_SIZE);
                model.assert_not_stale(&block);
                for other in &model.outstanding {
                    assert!(!overlaps(&block.reserved_range(), &other.reserved_range()));
                }
                ring.record(&block);
                model.outstanding.push(block);
            }
        } else {
            // The ring retires whole frames: everything outstanding goes.
            fence += 1;
            let mut frame = std::mem::take(&mut model.outstanding);
            for block in &frame {
                model.stale.push_back((block.reserved_range(), fence));
            }
            mgr.discard_master_blocks(&mut frame, fence);
            ring.submit(fence);

            completed = completed.max(fence.saturating_sub(rng.gen_range(0..4)));
            mgr.release_stale_blocks(completed);
            model.retire(completed);
            ring.retire(completed);
            assert_eq!(mgr.release_stale_blocks(completed), 0);
        }

        mgr.validate().unwrap();
        assert_eq!(mgr.used_size(), ring.used());
        assert_eq!(mgr.stats().pending_units, ring.frames.len());
    }

    let mut rest = std::mem::take(&mut model.outstanding);
    fence += 1;
    mgr.discard_master_blocks(&mut rest, fence);
    mgr.release_stale_blocks(fence);
    assert_eq!(mgr.used_size(), 0);
}

#[test]
fn verify_ring_wrap_skips_tail() {
    let mgr = RingBufferManager::new(BackingRegion::new(1024));

    let a = mgr.allocate_master_block(400, 16).unwrap();
    mgr.discard_master_blocks(&mut vec![a], 1);
    let b = mgr.allocate_master_block(400, 16).unwrap();
    mgr.discard_master_blocks(&mut vec![b], 2);
    mgr.release_stale_blocks(1);

    // 224 left before the end, 400 free at the start.
    let c = mgr.allocate_master_block(300, 16).unwrap();
    assert_eq!(c.offset(), 0);
    assert_eq!(mgr.used_size(), 400 + 224 + 300);

    // The skipped tail stays charged until the wrapping frame retires.
    mgr.discard_master_blocks(&mut vec![c], 3);
    mgr.release_stale_blocks(2);
    assert_eq!(mgr.used_size(), 224 + 300);
    mgr.release_stale_blocks(3);
    assert_eq!(mgr.used_size(), 0);
}

#[test]
fn verify_concrete_scenario_both_strategies() {
    fn run(mgr: &dyn MasterBlockManager) {
        let a = mgr.allocate_master_block(300, 16).unwrap();
        let b = mgr.allocate_master_block(300, 16).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 304);

        mgr.discard_master_blocks(&mut vec![a, b], 5);
        assert!(mgr
            .allocate_master_block(500, 16)
            .unwrap_err()
            .is_allocation_failure());
        mgr.release_stale_blocks(4);
        assert!(mgr.allocate_master_block(500, 16).is_err());
        mgr.release_stale_blocks(5);
        assert!(mgr.allocate_master_block(500, 16).is_ok());
    }

    run(&RingBufferManager::new(BackingRegion::new(1024)));
    run(&FreeListManager::new(BackingRegion::new(1024)));
}
