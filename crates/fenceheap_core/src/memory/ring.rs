//! # Ring Buffer Allocator
//!
//! A circular bump allocator whose space is reclaimed one frame at a time.

use std::collections::VecDeque;

use crate::error::{HeapError, HeapResult};
use crate::sync::FenceValue;

use super::{align_up, check_request, no_space, Allocation};

/// Where a finished frame ended and how much it occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameTail {
    /// Fence value that must complete before the frame is reclaimed.
    fence_value: FenceValue,
    /// Tail position at the moment the frame was finished.
    tail: u64,
    /// Units charged to the frame, including skipped wrap-around tails.
    size: u64,
}

/// A bump-pointer allocator over a circular buffer.
///
/// Allocations advance the tail. Finishing a frame records the tail together
/// with a fence value; once that fence completes the head jumps forward to
/// the recorded tail and everything the frame allocated becomes writable
/// again.
///
/// ```text
///   0        head                 tail          max
///   |  free   |##### in flight #####|    free    |
///
///   0   tail             head                   max
///   |####|      free      |##### in flight #####|
/// ```
///
/// # Thread Safety
///
/// The ring is NOT thread-safe. Wrap it in a mutex to share it.
///
/// # Example
///
/// ```rust
/// use fenceheap_core::memory::RingBuffer;
///
/// let mut ring = RingBuffer::new(1024);
/// let block = ring.allocate(300, 16).unwrap();
/// assert_eq!(block.offset(), 0);
///
/// ring.finish_current_frame(1);
/// ring.release_completed_frames(1);
/// assert!(ring.is_empty());
/// ```
#[derive(Debug)]
pub struct RingBuffer {
    /// Frames waiting for their fence, oldest first.
    completed_frame_tails: VecDeque<FrameTail>,
    /// Start of the oldest in-flight frame.
    head: u64,
    /// Next allocation position.
    tail: u64,
    /// Total capacity.
    max_size: u64,
    /// Units that are allocated, in flight or skipped.
    used_size: u64,
    /// Units charged to the frame being recorded.
    current_frame_size: u64,
}

impl RingBuffer {
    /// Creates a new ring of `max_size` units.
    #[must_use]
    pub fn new(max_size: u64) -> Self {
        Self {
            completed_frame_tails: VecDeque::new(),
            head: 0,
            tail: 0,
            max_size,
            used_size: 0,
            current_frame_size: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns the units that cannot be handed out right now.
    #[inline]
    #[must_use]
    pub const fn used_size(&self) -> u64 {
        self.used_size
    }

    /// Returns the units not charged to any frame.
    #[inline]
    #[must_use]
    pub const fn free_size(&self) -> u64 {
        self.max_size - self.used_size
    }

    /// Returns true when nothing is allocated or in flight.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used_size == 0
    }

    /// Returns true when every unit is charged to some frame.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.used_size == self.max_size
    }

    /// Returns the number of finished frames still waiting for their fence.
    #[inline]
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.completed_frame_tails.len()
    }

    /// Returns the number of contiguous writable spans (0, 1 or 2).
    #[must_use]
    pub fn writable_spans(&self) -> usize {
        if self.is_full() {
            0
        } else if self.tail >= self.head {
            usize::from(self.tail < self.max_size) + usize::from(self.head > 0)
        } else {
            1
        }
    }

    /// Allocates `size` units aligned to `alignment`.
    ///
    /// A request never straddles the end of the buffer: when it does not fit
    /// between the tail and the end, it is placed at offset 0 and the skipped
    /// tail is charged to the current frame.
    ///
    /// # Errors
    ///
    /// [`HeapError::OutOfMemory`] or [`HeapError::Fragmented`] when neither
    /// span can hold the request, [`HeapError::InvalidRequest`] for a zero
    /// size or a non-power-of-two alignment.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> HeapResult<Allocation> {
        check_request(size, alignment)?;
        if self.is_full() || size > self.max_size {
            return Err(no_space(size, alignment, self.free_size()));
        }

        if self.tail >= self.head {
            //  0      head              tail     max
            //  |        |###############|        |
            if let Some(aligned) = self.fits_before(self.max_size, alignment, size) {
                return Ok(self.advance(aligned, size));
            }
            // Wrap around; offset 0 satisfies every alignment.
            if size <= self.head {
                let skipped = self.max_size - self.tail;
                self.charge(skipped + size);
                self.tail = size;
                return Ok(Allocation::new(0, size, 0));
            }
        } else if let Some(aligned) = self.fits_before(self.head, alignment, size) {
            //  0      tail              head     max
            //  |########|               |########|
            return Ok(self.advance(aligned, size));
        }

        Err(no_space(size, alignment, self.free_size()))
    }

    /// Closes the frame being recorded and tags it with `fence_value`.
    ///
    /// Fence values must be non-decreasing across calls.
    pub fn finish_current_frame(&mut self, fence_value: FenceValue) {
        debug_assert!(
            self.completed_frame_tails
                .back()
                .map_or(true, |last| last.fence_value <= fence_value),
            "frame fence values must not decrease"
        );
        self.completed_frame_tails.push_back(FrameTail {
            fence_value,
            tail: self.tail,
            size: self.current_frame_size,
        });
        self.current_frame_size = 0;
    }

    /// Reclaims every finished frame whose fence value is at most
    /// `completed_fence_value`.
    ///
    /// Returns the number of frames reclaimed. Calling it again with the same
    /// value reclaims nothing.
    pub fn release_completed_frames(&mut self, completed_fence_value: FenceValue) -> usize {
        let mut released = 0;
        while let Some(oldest) = self.completed_frame_tails.front().copied() {
            if oldest.fence_value > completed_fence_value {
                break;
            }
            debug_assert!(oldest.size <= self.used_size);
            self.used_size -= oldest.size;
            self.head = oldest.tail;
            self.completed_frame_tails.pop_front();
            released += 1;
        }

        if self.is_empty() {
            // Nothing in flight: start over with one contiguous span. Frames
            // still pending are empty and end at the current tail.
            self.head = 0;
            self.tail = 0;
            for frame in &mut self.completed_frame_tails {
                debug_assert_eq!(frame.size, 0);
                frame.tail = 0;
            }
        }
        released
    }

    /// Checks that the frame bookkeeping accounts for exactly the used size.
    ///
    /// # Errors
    ///
    /// [`HeapError::Inconsistent`] describing the first broken invariant.
    pub fn validate(&self) -> HeapResult<()> {
        if self.used_size > self.max_size {
            return Err(HeapError::Inconsistent(format!(
                "used size {} exceeds capacity {}",
                self.used_size, self.max_size
            )));
        }
        if self.head > self.max_size || self.tail > self.max_size {
            return Err(HeapError::Inconsistent(format!(
                "cursor out of range: head {}, tail {}",
                self.head, self.tail
            )));
        }
        let charged: u64 =
            self.completed_frame_tails.iter().map(|f| f.size).sum::<u64>() + self.current_frame_size;
        if charged != self.used_size {
            return Err(HeapError::Inconsistent(format!(
                "frames account for {charged} units, used size is {}",
                self.used_size
            )));
        }
        // The occupied arc runs from head to tail (wrapping) unless full.
        let arc = if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.max_size - self.head + self.tail
        };
        if !self.is_full() && arc != self.used_size {
            return Err(HeapError::Inconsistent(format!(
                "occupied arc {arc} differs from used size {}",
                self.used_size
            )));
        }
        Ok(())
    }

    /// Returns the aligned position if `size` units fit before `limit`.
    fn fits_before(&self, limit: u64, alignment: u64, size: u64) -> Option<u64> {
        let aligned = align_up(self.tail, alignment)?;
        let end = aligned.checked_add(size)?;
        (end <= limit).then_some(aligned)
    }

    /// Bumps the tail past a block placed at `aligned`.
    fn advance(&mut self, aligned: u64, size: u64) -> Allocation {
        let padding = aligned - self.tail;
        self.charge(padding + size);
        self.tail = aligned + size;
        Allocation::new(aligned, size, padding)
    }

    fn charge(&mut self, units: u64) {
        self.used_size += units;
        self.current_frame_size += units;
    }
}
