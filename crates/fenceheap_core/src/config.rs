//! # Heap Configuration
//!
//! Which allocation strategy to use and how much capacity to manage, loaded
//! once at startup from TOML.
//!
//! ```toml
//! strategy = "free_list"
//! size = 67108864
//! default_alignment = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HeapError, HeapResult};
use crate::memory::INVALID_OFFSET;

/// Allocation strategy backing a [`crate::DynamicHeapManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapStrategy {
    /// Circular buffer reclaimed in whole frames.
    Ring,
    /// Coalescing free list reclaimed block by block.
    #[default]
    FreeList,
}

/// Configuration for a master block manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
    /// Allocation strategy.
    pub strategy: HeapStrategy,
    /// Capacity of the backing region.
    pub size: u64,
    /// Alignment used by [`crate::DynamicHeapManager::allocate_default`].
    pub default_alignment: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::free_list(64 << 20)
    }
}

impl HeapConfig {
    /// Ring buffer over `size` units with a 256-unit default alignment.
    #[must_use]
    pub const fn ring(size: u64) -> Self {
        Self {
            strategy: HeapStrategy::Ring,
            size,
            default_alignment: 256,
        }
    }

    /// Free list over `size` units with a 256-unit default alignment.
    #[must_use]
    pub const fn free_list(size: u64) -> Self {
        Self {
            strategy: HeapStrategy::FreeList,
            size,
            default_alignment: 256,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`HeapError::ConfigParse`] for malformed TOML,
    /// [`HeapError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> HeapResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| HeapError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`HeapError::ConfigIo`] if the file cannot be read, otherwise as
    /// [`HeapConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> HeapResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| HeapError::ConfigIo(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks that the values describe a usable heap.
    ///
    /// # Errors
    ///
    /// [`HeapError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> HeapResult<()> {
        if self.size == 0 || self.size == INVALID_OFFSET {
            return Err(HeapError::InvalidConfig(format!(
                "size must be between 1 and {}, got {}",
                INVALID_OFFSET - 1,
                self.size
            )));
        }
        if !self.default_alignment.is_power_of_two() {
            return Err(HeapError::InvalidConfig(format!(
                "default_alignment must be a power of two, got {}",
                self.default_alignment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ring_config() {
        let config = HeapConfig::from_toml_str(
            r#"
            strategy = "ring"
            size = 1048576
            default_alignment = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, HeapStrategy::Ring);
        assert_eq!(config.size, 1 << 20);
        assert_eq!(config.default_alignment, 64);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = HeapConfig::from_toml_str("size = 4096").unwrap();
        assert_eq!(config.strategy, HeapStrategy::FreeList);
        assert_eq!(config.default_alignment, 256);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let err = HeapConfig::from_toml_str("size = 4096\ndefault_alignment = 48").unwrap_err();
        assert!(matches!(err, HeapError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_size() {
        assert!(HeapConfig::ring(0).validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let err = HeapConfig::from_toml_str("strategy = \"buddy\"").unwrap_err();
        assert!(matches!(err, HeapError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HeapConfig::from_toml_file("/nonexistent/fenceheap.toml").unwrap_err();
        assert!(matches!(err, HeapError::ConfigIo(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = HeapConfig::ring(8192);
        let text = toml::to_string(&config).unwrap();
        assert_eq!(HeapConfig::from_toml_str(&text).unwrap(), config);
    }
}
