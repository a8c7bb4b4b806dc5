//! # Stale Block Queue
//!
//! FIFO of released blocks waiting for their fence to complete.

use std::collections::VecDeque;

use super::FenceValue;

/// A block the CPU is done with, paired with the fence guarding it.
#[derive(Debug, PartialEq, Eq)]
pub struct StaleBlock<B> {
    /// The parked block.
    pub block: B,
    /// Fence value that must complete before the block is reusable.
    pub fence_value: FenceValue,
}

/// Queue of stale blocks in discard order.
///
/// Blocks are pushed with non-decreasing fence values, so the queue is
/// sorted by fence value front to back and draining can stop at the first
/// entry whose fence has not completed yet.
///
/// # Thread Safety
///
/// The queue is NOT thread-safe. The free-list manager guards it with its
/// own mutex.
#[derive(Debug)]
pub struct StaleBlockQueue<B> {
    entries: VecDeque<StaleBlock<B>>,
}

impl<B> StaleBlockQueue<B> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Returns the number of parked blocks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is parked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the fence value of the most recently parked block.
    #[inline]
    #[must_use]
    pub fn last_fence_value(&self) -> Option<FenceValue> {
        self.entries.back().map(|entry| entry.fence_value)
    }

    /// Parks `block` until `fence_value` completes.
    ///
    /// Fence values must not decrease from one push to the next.
    pub fn push(&mut self, block: B, fence_value: FenceValue) {
        debug_assert!(
            self.last_fence_value().map_or(true, |last| last <= fence_value),
            "stale blocks must be discarded with non-decreasing fence values"
        );
        self.entries.push_back(StaleBlock { block, fence_value });
    }

    /// Pops the oldest block if its fence is at most `completed_fence_value`.
    pub fn pop_completed(&mut self, completed_fence_value: FenceValue) -> Option<StaleBlock<B>> {
        if self.entries.front()?.fence_value <= completed_fence_value {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Hands every block whose fence is at most `completed_fence_value` to
    /// `release`, oldest first, and returns how many were handed out.
    pub fn drain_completed<F>(&mut self, completed_fence_value: FenceValue, mut release: F) -> usize
    where
        F: FnMut(B),
    {
        let mut count = 0;
        while let Some(stale) = self.pop_completed(completed_fence_value) {
            release(stale.block);
            count += 1;
        }
        count
    }

    /// Iterates over the parked blocks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &StaleBlock<B>> {
        self.entries.iter()
    }
}

impl<B> Default for StaleBlockQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}
