//! Shared cache for decoded tiles.
//!
//! Decoding a JPEG tile costs far more than compositing it, so decoded
//! RGBA tiles are kept in an LRU shared by all painters of a reader.
//!
//! # Cache key
//!
//! Tiles are keyed by `(slide, area, tile col, tile row)`. The area
//! component is a stable ordinal assigned when the level stack is built;
//! the same area always maps to the same ordinal for the lifetime of the
//! reader, which is what makes the key stable across paint calls.
//!
//! # Reference counting
//!
//! Entries are handed out as `Arc<TileBuf>`: a painter holds its clone
//! while compositing and drops it afterwards, so eviction can never free
//! pixels someone is still reading. Concurrent painters that miss on the
//! same key may each decode the tile; the cache keeps one entry and the
//! losers' buffers die with their `Arc`s.

use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

/// Default cache capacity: 32MB of decoded pixels.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 32 * 1024 * 1024;

/// Bound on entry count, to keep LRU bookkeeping sane.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Key and value
// =============================================================================

/// Cache key for one decoded tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Slide identifier (the file path of the reader)
    pub slide: Arc<str>,

    /// Stable area ordinal within the reader
    pub area: u32,

    /// Tile column
    pub col: i64,

    /// Tile row
    pub row: i64,
}

impl TileKey {
    /// Create a new cache key.
    pub fn new(slide: Arc<str>, area: u32, col: i64, row: i64) -> Self {
        TileKey {
            slide,
            area,
            col,
            row,
        }
    }
}

/// One decoded tile: straight-alpha RGBA8, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBuf {
    /// Tile width in pixels
    pub width: u32,

    /// Tile height in pixels
    pub height: u32,

    /// Pixel data, row-major RGBA8
    pub pixels: Bytes,
}

impl TileBuf {
    /// Wrap decoded pixels in a tile buffer.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        TileBuf {
            width,
            height,
            pixels: Bytes::from(pixels),
        }
    }

    /// Byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

// =============================================================================
// TileCache
// =============================================================================

/// Size-bounded LRU of decoded tiles, shared across painters.
pub struct TileCache {
    cache: RwLock<LruCache<TileKey, Arc<TileBuf>>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl TileCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache bounded to `max_size` bytes of decoded pixels.
    pub fn with_capacity(max_size: usize) -> Self {
        TileCache {
            cache: RwLock::new(LruCache::new(
                std::num::NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap(),
            )),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileKey) -> Option<Arc<TileBuf>> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Insert a decoded tile and return the shared entry.
    ///
    /// Evicts least-recently-used entries until the total size fits.
    /// When two painters race on the same key, the second insert wins;
    /// both still hold valid entries through their `Arc`s.
    pub async fn put(&self, key: TileKey, tile: TileBuf) -> Arc<TileBuf> {
        let entry = Arc::new(tile);
        let entry_size = entry.byte_size();

        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old.byte_size());
        }

        cache.put(key, entry.clone());
        *current_size += entry_size;

        while *current_size > self.max_size {
            if let Some((_, evicted)) = cache.pop_lru() {
                *current_size = current_size.saturating_sub(evicted.byte_size());
            } else {
                break;
            }
        }

        entry
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    /// Total byte size of cached pixels.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// The configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
