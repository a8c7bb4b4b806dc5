//! Ring-buffer-based master block manager.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::HeapResult;
use crate::memory::{BackingRegion, RingBuffer};
use crate::sync::FenceValue;

use super::{ManagerId, ManagerStats, MasterBlock, MasterBlockManager};

/// Hands out master blocks from a circular buffer.
///
/// Blocks are never returned individually. Every discard closes the current
/// frame, and a frame's space comes back as a whole once its fence value
/// completes. This keeps allocation a pointer bump, at the price of all
/// users sharing one frame timeline.
pub struct RingBufferManager {
    id: ManagerId,
    region: BackingRegion,
    ring: Mutex<RingBuffer>,
    allocations: AtomicU64,
    failed_allocations: AtomicU64,
    retired_frames: AtomicU64,
}

impl RingBufferManager {
    /// Creates a manager owning `region`.
    #[must_use]
    pub fn new(region: BackingRegion) -> Self {
        Self {
            id: ManagerId::next(),
            ring: Mutex::new(RingBuffer::new(region.size())),
            region,
            allocations: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            retired_frames: AtomicU64::new(0),
        }
    }

    /// Returns the backing region this manager carves blocks from.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> &BackingRegion {
        &self.region
    }

    /// Checks the ring's frame bookkeeping.
    ///
    /// # Errors
    ///
    /// [`crate::HeapError::Inconsistent`] if the frames no longer account
    /// for the used size.
    pub fn validate(&self) -> HeapResult<()> {
        self.ring.lock().validate()
    }
}

impl MasterBlockManager for RingBufferManager {
    fn id(&self) -> ManagerId {
        self.id
    }

    fn allocate_master_block(&self, size: u64, alignment: u64) -> HeapResult<MasterBlock> {
        let result = self.ring.lock().allocate(size, alignment);
        match result {
            Ok(allocation) => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(offset = allocation.offset(), size, "ring master block allocated");
                Ok(MasterBlock::new(allocation, self.id))
            }
            Err(err) => {
                self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(size, alignment, error = %err, "ring master block allocation failed");
                Err(err)
            }
        }
    }

    fn discard_master_blocks(&self, blocks: &mut Vec<MasterBlock>, fence_value: FenceValue) {
        // Only the frame boundary matters; the blocks go back with their frame.
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
            }
        }
        self.ring.lock().finish_current_frame(fence_value);
        tracing::trace!(fence_value, "ring frame finished");
    }

    fn release_stale_blocks(&self, last_completed_fence_value: FenceValue) -> usize {
        let released = self
            .ring
            .lock()
            .release_completed_frames(last_completed_fence_value);
        if released > 0 {
            self.retired_frames.fetch_add(released as u64, Ordering::Relaxed);
            tracing::debug!(
                frames = released,
                fence_value = last_completed_fence_value,
                "ring frames retired"
            );
        }
        released
    }

    fn size(&self) -> u64 {
        self.region.size()
    }

    fn used_size(&self) -> u64 {
        self.ring.lock().used_size()
    }

    fn stats(&self) -> ManagerStats {
        let ring = self.ring.lock();
        ManagerStats {
            size: ring.max_size(),
            used_size: ring.used_size(),
            pending_units: ring.pending_frames(),
            free_ranges: ring.writable_spans(),
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            retired_units: self.retired_frames.load(Ordering::Relaxed),
        }
    }
}
