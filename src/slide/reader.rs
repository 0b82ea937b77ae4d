//! The vendor reader interface.
//!
//! Each supported vendor format implements [`SlideReader`]; the rest of
//! the crate (and the CLI) works against the trait. This crate ships one
//! implementation, [`crate::format::scn::ScnReader`]. Teardown is plain
//! `Drop`: readers own their handle pool and levels, nothing else.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ScnError;
use crate::slide::PropertyBag;
use crate::tile::RegionSurface;

// =============================================================================
// Level information
// =============================================================================

/// Snapshot of one output level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Level width in pixels
    pub width: i64,

    /// Level height in pixels
    pub height: i64,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    /// Number of acquisition areas composing this level
    pub areas: usize,
}

/// Snapshot of one associated (non-pyramidal) image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociatedImageInfo {
    /// Image name (e.g. `"macro"`)
    pub name: String,

    /// Image width in pixels
    pub width: i64,

    /// Image height in pixels
    pub height: i64,
}

// =============================================================================
// SlideReader
// =============================================================================

/// Interface of an opened whole-slide image.
///
/// Metadata accessors are synchronous reads of state fixed at open time
/// and are safe to call concurrently; painting may be called from many
/// tasks at once on the same reader.
#[async_trait]
pub trait SlideReader: Send + Sync {
    /// Number of output levels, sorted by descending width.
    fn level_count(&self) -> usize;

    /// Metadata of one level, `None` when out of range.
    fn level_info(&self, level: usize) -> Option<LevelInfo>;

    /// Level-0 dimensions in pixels.
    fn dimensions(&self) -> Option<(i64, i64)> {
        self.level_info(0).map(|info| (info.width, info.height))
    }

    /// Slide properties, fixed after open.
    fn properties(&self) -> &PropertyBag;

    /// Associated images available on this slide.
    fn associated_images(&self) -> Vec<AssociatedImageInfo>;

    /// The coarsest level whose downsample does not exceed the requested
    /// factor, falling back to level 0 for requests finer than level 0.
    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        if self.level_count() == 0 {
            return None;
        }
        let mut best = 0;
        for level in 0..self.level_count() {
            let info = self.level_info(level)?;
            // Small tolerance so a nominal 4.0 request matches a 4.0001 level
            if info.downsample <= downsample * 1.01 {
                best = level;
            }
        }
        Some(best)
    }

    /// Paint a pixel region onto `dest`.
    ///
    /// `(x, y)` are level-0 pixel coordinates of the region's top-left
    /// corner; `w`/`h` are in pixels of the target level. The painted
    /// region matches `dest`'s size.
    async fn paint_region(
        &self,
        dest: &mut RegionSurface,
        x: i64,
        y: i64,
        level: usize,
        w: u32,
        h: u32,
    ) -> Result<(), ScnError>;

    /// Read an associated image in full.
    async fn read_associated_image(&self, name: &str) -> Result<RegionSurface, ScnError>;
}

// =============================================================================
// Tests
// =============================================================================
