//! # Free-List Allocator
//!
//! Variable-size allocator that keeps free ranges sorted by offset and by
//! size, and merges neighbouring ranges as they are freed.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{HeapError, HeapResult};

use super::{align_up, check_request, no_space, Allocation};

/// A best-fit allocator over `[0, max_size)`.
///
/// Free ranges are indexed twice:
/// - by offset, to find the neighbours of a range being freed
/// - by `(size, offset)`, to find the smallest range that fits a request
///
/// Adjacent free ranges are always merged, so the free list never holds two
/// ranges that touch.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Wrap it in a mutex to share it.
///
/// # Example
///
/// ```rust
/// use fenceheap_core::memory::FreeListAllocator;
///
/// let mut heap = FreeListAllocator::new(1024);
/// let a = heap.allocate(100, 16).unwrap();
/// let b = heap.allocate(100, 16).unwrap();
/// assert_eq!(heap.used_size(), 212);
///
/// heap.free(a);
/// heap.free(b);
/// assert_eq!(heap.free_block_count(), 1);
/// ```
#[derive(Debug)]
pub struct FreeListAllocator {
    /// Free ranges: offset -> size.
    free_by_offset: BTreeMap<u64, u64>,
    /// Free ranges ordered by (size, offset).
    free_by_size: BTreeSet<(u64, u64)>,
    /// Total capacity.
    max_size: u64,
    /// Sum of all free range sizes.
    free_size: u64,
}

impl FreeListAllocator {
    /// Creates an allocator whose whole capacity is one free range.
    #[must_use]
    pub fn new(max_size: u64) -> Self {
        let mut allocator = Self {
            free_by_offset: BTreeMap::new(),
            free_by_size: BTreeSet::new(),
            max_size,
            free_size: 0,
        };
        if max_size > 0 {
            allocator.insert_free(0, max_size);
        }
        allocator
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns the units outside the free list.
    #[inline]
    #[must_use]
    pub const fn used_size(&self) -> u64 {
        self.max_size - self.free_size
    }

    /// Returns the units in the free list.
    #[inline]
    #[must_use]
    pub const fn free_size(&self) -> u64 {
        self.free_size
    }

    /// Returns the number of disjoint free ranges.
    #[inline]
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_by_offset.len()
    }

    /// Returns the size of the largest free range, or 0 when full.
    #[inline]
    #[must_use]
    pub fn largest_free_block(&self) -> u64 {
        self.free_by_size.last().map_or(0, |&(size, _)| size)
    }

    /// Allocates `size` units aligned to `alignment`.
    ///
    /// Picks the smallest free range that can hold the request once its
    /// start is aligned; ties go to the lowest offset. Padding in front of
    /// the aligned start is charged to the allocation.
    ///
    /// # Errors
    ///
    /// [`HeapError::OutOfMemory`] when too little is free overall,
    /// [`HeapError::Fragmented`] when no single range fits,
    /// [`HeapError::InvalidRequest`] for a zero size or a non-power-of-two
    /// alignment.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> HeapResult<Allocation> {
        check_request(size, alignment)?;
        if size > self.free_size {
            return Err(no_space(size, alignment, self.free_size));
        }

        let found = self
            .free_by_size
            .range((size, 0)..)
            .find_map(|&(block_size, block_offset)| {
                let aligned = align_up(block_offset, alignment)?;
                let padding = aligned - block_offset;
                (padding.checked_add(size)? <= block_size)
                    .then_some((block_offset, block_size, aligned, padding))
            });
        let Some((block_offset, block_size, aligned, padding)) = found else {
            return Err(no_space(size, alignment, self.free_size));
        };

        self.remove_free(block_offset, block_size);
        let remainder = block_size - padding - size;
        if remainder > 0 {
            self.insert_free(aligned + size, remainder);
        }

        Ok(Allocation::new(aligned, size, padding))
    }

    /// Returns an allocation's range, padding included, to the free list.
    ///
    /// The range is merged with the free ranges directly before and after it.
    /// Freeing the invalid allocation is a no-op.
    pub fn free(&mut self, allocation: Allocation) {
        if !allocation.is_valid() {
            return;
        }
        let range = allocation.reserved_range();
        let mut start = range.start;
        let mut end = range.end;
        debug_assert!(end <= self.max_size, "range {start}..{end} is outside the heap");

        let prev = self
            .free_by_offset
            .range(..start)
            .next_back()
            .map(|(&offset, &size)| (offset, size));
        let next = self
            .free_by_offset
            .range(start..)
            .next()
            .map(|(&offset, &size)| (offset, size));
        debug_assert!(
            prev.map_or(true, |(offset, size)| offset + size <= start),
            "range {start}..{end} overlaps a free range (double free?)"
        );
        debug_assert!(
            next.map_or(true, |(offset, _)| offset >= end),
            "range {start}..{end} overlaps a free range (double free?)"
        );

        if let Some((offset, size)) = prev.filter(|&(offset, size)| offset + size == start) {
            self.remove_free(offset, size);
            start = offset;
        }
        if let Some((offset, size)) = next.filter(|&(offset, _)| offset == end) {
            self.remove_free(offset, size);
            end = offset + size;
        }
        self.insert_free(start, end - start);
    }

    /// Checks that the two indexes agree and describe sorted, disjoint,
    /// fully merged ranges.
    ///
    /// # Errors
    ///
    /// [`HeapError::Inconsistent`] describing the first broken invariant.
    pub fn validate(&self) -> HeapResult<()> {
        if self.free_by_offset.len() != self.free_by_size.len() {
            return Err(HeapError::Inconsistent(format!(
                "{} ranges by offset, {} by size",
                self.free_by_offset.len(),
                self.free_by_size.len()
            )));
        }

        let mut total = 0u64;
        let mut previous_end: Option<u64> = None;
        for (&offset, &size) in &self.free_by_offset {
            if size == 0 || !self.free_by_size.contains(&(size, offset)) {
                return Err(HeapError::Inconsistent(format!(
                    "free range at {offset} (size {size}) is not indexed by size"
                )));
            }
            if let Some(end) = previous_end {
                if offset <= end {
                    return Err(HeapError::Inconsistent(format!(
                        "free range at {offset} touches or overlaps the range ending at {end}"
                    )));
                }
            }
            let end = offset + size;
            if end > self.max_size {
                return Err(HeapError::Inconsistent(format!(
                    "free range {offset}..{end} exceeds capacity {}",
                    self.max_size
                )));
            }
            total += size;
            previous_end = Some(end);
        }

        if total != self.free_size {
            return Err(HeapError::Inconsistent(format!(
                "free ranges sum to {total}, free size is {}",
                self.free_size
            )));
        }
        Ok(())
    }

    /// Iterates over the free ranges in offset order.
    pub fn free_ranges(&self) -> impl Iterator<Item = std::ops::Range<u64>> + '_ {
        self.free_by_offset
            .iter()
            .map(|(&offset, &size)| offset..offset + size)
    }

    fn insert_free(&mut self, offset: u64, size: u64) {
        self.free_by_offset.insert(offset, size);
        self.free_by_size.insert((size, offset));
        self.free_size += size;
    }

    fn remove_free(&mut self, offset: u64, size: u64) {
        self.free_by_offset.remove(&offset);
        self.free_by_size.remove(&(size, offset));
        self.free_size -= size;
    }
}
