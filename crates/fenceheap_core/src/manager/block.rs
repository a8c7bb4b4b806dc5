//! Master block handles and manager identities.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory::Allocation;

/// Unique identity of a manager instance.
///
/// Every block remembers the manager that issued it so that handing a block
/// to the wrong manager is caught instead of corrupting its free space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Identity carried by the invalid block.
    pub const NONE: Self = Self(0);

    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A coarse range of the backing region, owned by whoever holds it.
///
/// Blocks are not `Clone`: giving one back to the manager moves it, so a
/// block cannot be discarded twice through safe code.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a master block leaks its range until the manager is dropped"]
pub struct MasterBlock {
    allocation: Allocation,
    owner: ManagerId,
}

impl MasterBlock {
    pub(crate) const fn new(allocation: Allocation, owner: ManagerId) -> Self {
        Self { allocation, owner }
    }

    /// The "no allocation" block, at [`crate::memory::INVALID_OFFSET`].
    ///
    /// Useful as a placeholder in fixed-size block tables. Discarding it is
    /// a no-op.
    pub const fn invalid() -> Self {
        Self {
            allocation: Allocation::invalid(),
            owner: ManagerId::NONE,
        }
    }

    /// Start of the usable range, aligned as requested.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.allocation.offset()
    }

    /// Size of the usable range, as requested.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.allocation.size()
    }

    /// The usable range `offset..offset + size`.
    #[inline]
    #[must_use]
    pub const fn range(&self) -> Range<u64> {
        self.offset()..self.offset() + self.size()
    }

    /// Returns false for [`MasterBlock::invalid`].
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.allocation.is_valid()
    }

    /// The manager that issued this block.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> ManagerId {
        self.owner
    }

    /// The range kept out of free space, alignment padding included.
    #[inline]
    #[must_use]
    pub const fn reserved_range(&self) -> Range<u64> {
        self.allocation.reserved_range()
    }

    pub(crate) fn into_allocation(self) -> Allocation {
        self.allocation
    }
}

impl Default for MasterBlock {
    fn default() -> Self {
        Self::invalid()
    }
}
