//! # FENCEHEAP Core
//!
//! Fence-gated master block management for GPU dynamic heaps:
//! - Coarse ranges ("master blocks") carved out of one pre-reserved region
//! - Space reused only after the GPU fence guarding it has completed
//! - Safe to share between worker threads recording command lists
//!
//! ## Architecture
//!
//! ```text
//!   memory::RingBuffer ─────────────► RingBufferManager ──┐
//!                                                         ├─► MasterBlockManager
//!   memory::FreeListAllocator ──┬───► FreeListManager ────┘        ▲
//!   sync::StaleBlockQueue ──────┘                                  │
//!                                              DynamicHeapManager ─┘
//! ```
//!
//! ## Rules
//!
//! 1. **Allocation failure is a value** - never a panic, never a wait
//! 2. **Contract violations are loud** - asserted in debug builds
//! 3. **Fences only grow** - retirement stops at the first pending fence
//!
//! ## Example
//!
//! ```rust
//! use fenceheap_core::{BackingRegion, FreeListManager, MasterBlockManager};
//!
//! let heap = FreeListManager::new(BackingRegion::new(1024));
//! let a = heap.allocate_master_block(300, 16).unwrap();
//! let b = heap.allocate_master_block(300, 16).unwrap();
//!
//! // Frame 5 was submitted; the GPU may still read a and b.
//! heap.discard_master_blocks(&mut vec![a, b], 5);
//! assert!(heap.allocate_master_block(500, 16).is_err());
//!
//! // The GPU signalled fence 5.
//! heap.release_stale_blocks(5);
//! assert!(heap.allocate_master_block(500, 16).is_ok());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod sync;

pub use config::{HeapConfig, HeapStrategy};
pub use error::{HeapError, HeapResult};
pub use manager::{
    DynamicHeapManager, FreeListManager, HeapBackend, ManagerId, ManagerStats, MasterBlock,
    MasterBlockManager, RingBufferManager,
};
pub use memory::{Allocation, BackingRegion, FreeListAllocator, RingBuffer, INVALID_OFFSET};
pub use sync::{FenceValue, StaleBlock, StaleBlockQueue};
