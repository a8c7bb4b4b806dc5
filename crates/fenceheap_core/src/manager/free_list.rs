//! Free-list-based master block manager.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{HeapError, HeapResult};
use crate::memory::{BackingRegion, FreeListAllocator};
use crate::sync::{FenceValue, StaleBlockQueue};

use super::{ManagerId, ManagerStats, MasterBlock, MasterBlockManager};

/// Hands out master blocks from a coalescing free list.
///
/// Discarded blocks are parked in a stale queue together with their fence
/// value and only go back to the free list once that fence has completed.
///
/// ## Locking
///
/// ```text
/// allocate_master_block  ──> [allocator]
/// discard_master_blocks  ──────────────────> [stale queue]
/// release_stale_blocks   ──> [allocator] ──> [stale queue]
/// ```
///
/// The allocator lock is always taken before the queue lock.
pub struct FreeListManager {
    id: ManagerId,
    region: BackingRegion,
    allocator: Mutex<FreeListAllocator>,
    stale_blocks: Mutex<StaleBlockQueue<MasterBlock>>,
    allocations: AtomicU64,
    failed_allocations: AtomicU64,
    retired_blocks: AtomicU64,
}

impl FreeListManager {
    /// Creates a manager owning `region`.
    #[must_use]
    pub fn new(region: BackingRegion) -> Self {
        Self {
            id: ManagerId::next(),
            allocator: Mutex::new(FreeListAllocator::new(region.size())),
            region,
            stale_blocks: Mutex::new(StaleBlockQueue::new()),
            allocations: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            retired_blocks: AtomicU64::new(0),
        }
    }

    /// Returns the backing region this manager carves blocks from.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> &BackingRegion {
        &self.region
    }

    /// Returns the number of blocks waiting for their fence.
    #[must_use]
    pub fn stale_block_count(&self) -> usize {
        self.stale_blocks.lock().len()
    }

    /// Returns the ranges currently available for allocation, in offset
    /// order.
    #[must_use]
    pub fn free_ranges(&self) -> Vec<Range<u64>> {
        self.allocator.lock().free_ranges().collect()
    }

    /// Checks that free ranges and parked blocks never overlap and that the
    /// free list is internally consistent.
    ///
    /// # Errors
    ///
    /// [`HeapError::Inconsistent`] describing the first broken invariant.
    pub fn validate(&self) -> HeapResult<()> {
        let allocator = self.allocator.lock();
        let stale_blocks = self.stale_blocks.lock();
        allocator.validate()?;

        let mut ranges: Vec<_> = allocator.free_ranges().collect();
        ranges.extend(stale_blocks.iter().map(|stale| stale.block.reserved_range()));
        ranges.sort_by_key(|range| range.start);
        for pair in ranges.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(HeapError::Inconsistent(format!(
                    "ranges {:?} and {:?} overlap",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

impl MasterBlockManager for FreeListManager {
    fn id(&self) -> ManagerId {
        self.id
    }

    fn allocate_master_block(&self, size: u64, alignment: u64) -> HeapResult<MasterBlock> {
        let result = self.allocator.lock().allocate(size, alignment);
        match result {
            Ok(allocation) => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(offset = allocation.offset(), size, "free-list master block allocated");
                Ok(MasterBlock::new(allocation, self.id))
            }
            Err(err) => {
                self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(size, alignment, error = %err, "free-list master block allocation failed");
                Err(err)
            }
        }
    }

    fn discard_master_blocks(&self, blocks: &mut Vec<MasterBlock>, fence_value: FenceValue) {
        let mut stale_blocks = self.stale_blocks.lock();
        for block in blocks.drain(..) {
            if !block.is_valid() {
                continue;
            }
            debug_assert_eq!(
                block.owner(),
                self.id,
                "master block discarded to a manager that did not issue it"
            );
            if block.owner() != self.id {
                tracing::error!(
                    owner = block.owner().get(),
                    manager = self.id.get(),
                    "ignoring master block issued by another manager"
                );
                continue;
            }
            tracing::trace!(offset = block.offset(), fence_value, "master block discarded");
            stale_blocks.push(block, fence_value);
        }
    }

    fn release_stale_blocks(&self, last_completed_fence_value: FenceValue) -> usize {
        let mut allocator = self.allocator.lock();
        let mut stale_blocks = self.stale_blocks.lock();
        let released = stale_blocks.drain_completed(last_completed_fence_value, |block| {
            allocator.free(block.into_allocation());
        });
        if released > 0 {
            self.retired_blocks.fetch_add(released as u64, Ordering::Relaxed);
            tracing::debug!(
                blocks = released,
                fence_value = last_completed_fence_value,
                "stale master blocks retired"
            );
        }
        released
    }

    fn size(&self) -> u64 {
        self.region.size()
    }

    fn used_size(&self) -> u64 {
        self.allocator.lock().used_size()
    }

    fn stats(&self) -> ManagerStats {
        let allocator = self.allocator.lock();
        let stale_blocks = self.stale_blocks.lock();
        ManagerStats {
            size: allocator.max_size(),
            used_size: allocator.used_size(),
            pending_units: stale_blocks.len(),
            free_ranges: allocator.free_block_count(),
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            retired_units: self.retired_blocks.load(Ordering::Relaxed),
        }
    }
}
