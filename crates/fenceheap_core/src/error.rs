//! # Heap Error Types
//!
//! All errors that can occur while managing master blocks.

use thiserror::Error;

/// Errors that can occur in the master block managers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Not enough free capacity left to satisfy the request.
    #[error("out of memory: requested {requested} bytes, {available} bytes free")]
    OutOfMemory {
        /// The size that was requested.
        requested: u64,
        /// Capacity that is currently free.
        available: u64,
    },

    /// Enough capacity is free in total, but no single contiguous range fits
    /// the request once alignment padding is accounted for.
    #[error("fragmented: no contiguous range of {requested} bytes (alignment {alignment})")]
    Fragmented {
        /// The size that was requested.
        requested: u64,
        /// The requested alignment.
        alignment: u64,
    },

    /// The request breaks the allocation contract (zero size or
    /// non-power-of-two alignment).
    #[error("invalid request: size {size}, alignment {alignment}")]
    InvalidRequest {
        /// The size that was requested.
        size: u64,
        /// The requested alignment.
        alignment: u64,
    },

    /// Internal bookkeeping no longer partitions the backing region.
    #[error("inconsistent allocator state: {0}")]
    Inconsistent(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(String),

    /// The configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),
}

impl HeapError {
    /// Returns true for out-of-space conditions the caller can recover from
    /// by releasing stale blocks and retrying.
    #[inline]
    #[must_use]
    pub const fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::Fragmented { .. })
    }
}

/// Result type for heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
