//! # Master Block Managers
//!
//! Thread-safe front ends over the allocator cores. A manager hands out
//! master blocks, takes them back tagged with a fence value, and makes their
//! space reusable once the caller reports that fence as completed.
//!
//! ## Strategies
//!
//! | Manager              | Core                  | Reclaims        |
//! |----------------------|-----------------------|-----------------|
//! | [`RingBufferManager`] | [`crate::memory::RingBuffer`] | whole frames |
//! | [`FreeListManager`]  | [`crate::memory::FreeListAllocator`] | single blocks |
//!
//! Consumers are written against [`MasterBlockManager`]; the concrete
//! strategy is picked once, at construction, through [`DynamicHeapManager`].

mod block;
mod free_list;
mod ring;

pub use block::{ManagerId, MasterBlock};
pub use free_list::FreeListManager;
pub use ring::RingBufferManager;

use crate::config::{HeapConfig, HeapStrategy};
use crate::error::HeapResult;
use crate::memory::BackingRegion;
use crate::sync::FenceValue;

/// Point-in-time view of a manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Capacity of the backing region.
    pub size: u64,
    /// Capacity allocated, waiting for a fence, or lost to padding.
    pub used_size: u64,
    /// Frames (ring) or blocks (free list) waiting for their fence.
    pub pending_units: usize,
    /// Disjoint ranges currently available for allocation.
    pub free_ranges: usize,
    /// Successful allocations since creation.
    pub allocations: u64,
    /// Failed allocations since creation.
    pub failed_allocations: u64,
    /// Frames or blocks retired since creation.
    pub retired_units: u64,
}

/// The contract shared by every master block manager.
///
/// All methods take `&self` and may be called concurrently from any thread.
/// None of them wait: when there is no room the allocation fails right away
/// and the caller decides whether to release stale blocks and retry.
///
/// Fence values passed to [`Self::discard_master_blocks`] must not decrease
/// over the life of the manager.
pub trait MasterBlockManager: Send + Sync {
    /// Identity stamped into every block this manager issues.
    fn id(&self) -> ManagerId;

    /// Allocates a range of at least `size` units aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// [`crate::HeapError::OutOfMemory`] or [`crate::HeapError::Fragmented`]
    /// when no range fits. Zero sizes and non-power-of-two alignments are
    /// contract violations: they assert in debug builds and return
    /// [`crate::HeapError::InvalidRequest`] otherwise.
    fn allocate_master_block(&self, size: u64, alignment: u64) -> HeapResult<MasterBlock>;

    /// Takes every block out of `blocks` and parks it until `fence_value`
    /// completes. The vector is left empty so its storage can be reused.
    fn discard_master_blocks(&self, blocks: &mut Vec<MasterBlock>, fence_value: FenceValue);

    /// Makes the space of everything discarded with a fence value at most
    /// `last_completed_fence_value` available again.
    ///
    /// Returns the number of frames or blocks retired. Repeating a call with
    /// the same value retires nothing.
    fn release_stale_blocks(&self, last_completed_fence_value: FenceValue) -> usize;

    /// Capacity of the backing region.
    fn size(&self) -> u64;

    /// Capacity that cannot currently be allocated.
    fn used_size(&self) -> u64;

    /// Snapshot of sizes and counters.
    fn stats(&self) -> ManagerStats;
}

/// The two manager strategies.
pub enum HeapBackend {
    /// Ring buffer strategy.
    Ring(RingBufferManager),
    /// Free list strategy.
    FreeList(FreeListManager),
}

/// A master block manager whose strategy is chosen at construction.
///
/// # Example
///
/// ```rust
/// use fenceheap_core::{DynamicHeapManager, HeapConfig, MasterBlockManager};
///
/// let heap = DynamicHeapManager::from_config(&HeapConfig::ring(1 << 20)).unwrap();
/// let block = heap.allocate_default(4096).unwrap();
///
/// heap.discard_master_blocks(&mut vec![block], 1);
/// heap.release_stale_blocks(1);
/// assert_eq!(heap.used_size(), 0);
/// ```
pub struct DynamicHeapManager {
    backend: HeapBackend,
    default_alignment: u64,
}

impl DynamicHeapManager {
    /// Builds the manager described by `config`.
    ///
    /// # Errors
    ///
    /// [`crate::HeapError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn from_config(config: &HeapConfig) -> HeapResult<Self> {
        config.validate()?;
        let region = BackingRegion::new(config.size);
        let backend = match config.strategy {
            HeapStrategy::Ring => HeapBackend::Ring(RingBufferManager::new(region)),
            HeapStrategy::FreeList => HeapBackend::FreeList(FreeListManager::new(region)),
        };
        tracing::debug!(
            strategy = ?config.strategy,
            size = config.size,
            "dynamic heap manager created"
        );
        Ok(Self {
            backend,
            default_alignment: config.default_alignment,
        })
    }

    /// Returns the strategy in use.
    #[must_use]
    pub const fn strategy(&self) -> HeapStrategy {
        match self.backend {
            HeapBackend::Ring(_) => HeapStrategy::Ring,
            HeapBackend::FreeList(_) => HeapStrategy::FreeList,
        }
    }

    /// Returns the concrete manager.
    #[must_use]
    pub const fn backend(&self) -> &HeapBackend {
        &self.backend
    }

    /// Allocates with the configured default alignment.
    ///
    /// # Errors
    ///
    /// As [`MasterBlockManager::allocate_master_block`].
    pub fn allocate_default(&self, size: u64) -> HeapResult<MasterBlock> {
        self.allocate_master_block(size, self.default_alignment)
    }

    /// Checks the bookkeeping of the underlying manager.
    ///
    /// # Errors
    ///
    /// [`crate::HeapError::Inconsistent`] describing the first broken
    /// invariant.
    pub fn validate(&self) -> HeapResult<()> {
        match &self.backend {
            HeapBackend::Ring(mgr) => mgr.validate(),
            HeapBackend::FreeList(mgr) => mgr.validate(),
        }
    }

    fn inner(&self) -> &dyn MasterBlockManager {
        match &self.backend {
            HeapBackend::Ring(mgr) => mgr,
            HeapBackend::FreeList(mgr) => mgr,
        }
    }
}

impl MasterBlockManager for DynamicHeapManager {
    fn id(&self) -> ManagerId {
        self.inner().id()
    }

    fn allocate_master_block(&self, size: u64, alignment: u64) -> HeapResult<MasterBlock> {
        self.inner().allocate_master_block(size, alignment)
    }

    fn discard_master_blocks(&self, blocks: &mut Vec<MasterBlock>, fence_value: FenceValue) {
        self.inner().discard_master_blocks(blocks, fence_value);
    }

    fn release_stale_blocks(&self, last_completed_fence_value: FenceValue) -> usize {
        self.inner().release_stale_blocks(last_completed_fence_value)
    }

    fn size(&self) -> u64 {
        self.inner().size()
    }

    fn used_size(&self) -> u64 {
        self.inner().used_size()
    }

    fn stats(&self) -> ManagerStats {
        self.inner().stats()
    }
}
