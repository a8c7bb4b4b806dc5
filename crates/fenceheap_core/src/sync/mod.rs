//! # Fence Synchronization
//!
//! The GPU consumes memory long after the CPU is done with it. Everything the
//! CPU gives back is therefore parked behind a fence value:
//!
//! ```text
//! CPU:  allocate ──> record commands ──> discard(fence = N)
//!                                              │
//! GPU:                     ... executes frame N ... signals N
//!                                              │
//! CPU:                         release_stale_blocks(completed = N)
//!                                              ▼
//!                                      range is reusable
//! ```
//!
//! Fence values only ever grow, so the oldest parked entry is always the
//! first one to become reusable.

mod stale_queue;

pub use stale_queue::{StaleBlock, StaleBlockQueue};

/// GPU progress marker. A value is completed once the GPU has finished all
/// work submitted up to and including it.
pub type FenceValue = u64;
