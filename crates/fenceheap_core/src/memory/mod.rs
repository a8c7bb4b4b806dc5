//! # Memory Management
//!
//! Offset-based allocator cores for a pre-reserved backing region.
//!
//! ## Design Philosophy
//!
//! The backing region is reserved once at startup. The cores only ever deal
//! in offsets into it:
//! - No pointers, no unsafe
//! - Allocation failure is a value
//! - Cores are single-threaded; the managers add locking on top

mod free_list;
mod ring;

pub use free_list::FreeListAllocator;
pub use ring::RingBuffer;

use crate::error::{HeapError, HeapResult};

/// Offset value reserved to mean "no allocation".
pub const INVALID_OFFSET: u64 = u64::MAX;

/// Fixed-size capacity that a manager carves master blocks out of.
///
/// The region itself (a GPU buffer, an upload heap, a chunk of mapped
/// memory) lives outside this crate; only its size matters here.
#[derive(Debug, PartialEq, Eq)]
pub struct BackingRegion {
    size: u64,
}

impl BackingRegion {
    /// Describes a backing region of `size` units.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `size` is zero or equal to [`INVALID_OFFSET`].
    #[must_use]
    pub const fn new(size: u64) -> Self {
        debug_assert!(size > 0, "backing region must not be empty");
        debug_assert!(size != INVALID_OFFSET, "backing region size collides with INVALID_OFFSET");
        Self { size }
    }

    /// Returns the capacity of the region.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// A range handed out by one of the allocator cores.
///
/// `padding` is the number of units in front of `offset` that were consumed
/// to honor the requested alignment. They belong to the allocation and are
/// returned together with it.
///
/// Deliberately not `Clone`: an allocation is freed by value, so it cannot be
/// freed twice.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    offset: u64,
    size: u64,
    padding: u64,
}

impl Allocation {
    #[inline]
    pub(crate) const fn new(offset: u64, size: u64, padding: u64) -> Self {
        Self { offset, size, padding }
    }

    /// The empty allocation, at [`INVALID_OFFSET`].
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self { offset: INVALID_OFFSET, size: 0, padding: 0 }
    }

    /// Aligned start of the usable range.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Usable size, as requested by the caller.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Alignment padding consumed in front of [`Self::offset`].
    #[inline]
    #[must_use]
    pub const fn padding(&self) -> u64 {
        self.padding
    }

    /// Returns false for the [`INVALID_OFFSET`] sentinel.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.offset != INVALID_OFFSET
    }

    /// The whole range this allocation keeps out of the free space,
    /// padding included.
    #[inline]
    #[must_use]
    pub const fn reserved_range(&self) -> std::ops::Range<u64> {
        (self.offset - self.padding)..(self.offset + self.size)
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow. `alignment` must be a power of two.
#[inline]
#[must_use]
pub const fn align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(bumped) => Some(bumped & !(alignment - 1)),
        None => None,
    }
}

/// Checks the allocation contract shared by both cores.
///
/// Violations are programmer errors: they assert in debug builds and are
/// rejected in release builds.
pub(crate) fn check_request(size: u64, alignment: u64) -> HeapResult<()> {
    debug_assert!(size > 0, "zero-sized master block requested");
    debug_assert!(
        alignment.is_power_of_two(),
        "alignment {alignment} is not a power of two"
    );
    if size == 0 || !alignment.is_power_of_two() {
        return Err(HeapError::InvalidRequest { size, alignment });
    }
    Ok(())
}

/// Picks the error to report when `size` did not fit.
#[inline]
pub(crate) const fn no_space(size: u64, alignment: u64, free: u64) -> HeapError {
    if free >= size {
        HeapError::Fragmented { requested: size, alignment }
    } else {
        HeapError::OutOfMemory { requested: size, available: free }
    }
}
