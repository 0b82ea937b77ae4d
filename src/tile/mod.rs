//! Tile compositing layer.
//!
//! Everything between "decoded tile pixels" and "a painted region":
//!
//! - [`TileCache`]: shared LRU of decoded RGBA tiles, keyed by
//!   `(slide, area, col, row)`, entries reference-counted via `Arc`
//! - [`TileGrid`]: maps a pixel region to the tiles covering it and
//!   drives the per-tile paint callback
//! - [`RegionSurface`]: the straight-alpha RGBA target tiles are
//!   composited onto
//! - JPEG encoding of finished surfaces for the CLI

mod cache;
mod encoder;
mod grid;
mod surface;

pub use cache::{TileBuf, TileCache, TileKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, encode_jpeg, is_valid_quality, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use grid::{TileGrid, TilePainter};
pub use surface::RegionSurface;
