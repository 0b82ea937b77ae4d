//! Reader configuration.
//!
//! [`ReaderOptions`] sizes the per-slide resources: the TIFF handle
//! pool, each handle's block cache, and the decoded-tile cache. The
//! defaults suit an interactive viewer on one slide; batch pipelines
//! over many slides usually shrink the tile cache and grow the pool.

use crate::io::DEFAULT_BLOCK_SIZE;
use crate::tile::DEFAULT_TILE_CACHE_CAPACITY;

/// Default number of TIFF handles per reader.
pub const DEFAULT_MAX_HANDLES: usize = 8;

/// Default number of cached blocks per handle.
pub const DEFAULT_CACHE_BLOCKS: usize = 64;

/// Resource sizing for one opened slide.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Maximum concurrently open TIFF handles (file descriptors).
    ///
    /// Each painting call holds one handle for its duration; callers
    /// beyond this bound wait.
    pub max_handles: usize,

    /// Block size in bytes for each handle's block cache.
    pub block_size: usize,

    /// Number of blocks cached per handle.
    pub cache_blocks: usize,

    /// Decoded-tile cache capacity in bytes.
    pub cache_tiles: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            max_handles: DEFAULT_MAX_HANDLES,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            cache_tiles: DEFAULT_TILE_CACHE_CAPACITY,
        }
    }
}

impl ReaderOptions {
    /// Validate the options, returning an error message when invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_handles == 0 {
            return Err("max_handles must be greater than 0".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.block_size < 1024 || self.block_size > 16 * 1024 * 1024 {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
