//! Tile grid: maps a pixel region onto the tiles that cover it.
//!
//! Each area of a level owns one grid sized to its directory's tile
//! layout. The grid itself holds no back-reference to the area; whatever
//! context a tile read needs travels in the [`TilePainter`] passed to
//! each `paint_region` call, so areas stay immutable after construction.

use async_trait::async_trait;

use crate::error::ScnError;

use super::surface::RegionSurface;

/// Callback invoked for every tile a region intersects.
#[async_trait]
pub trait TilePainter: Sync {
    /// Paint one tile onto `dest` with its top-left corner at
    /// `(dest_x, dest_y)` in surface coordinates (possibly negative).
    async fn paint_tile(
        &self,
        dest: &mut RegionSurface,
        tile_col: i64,
        tile_row: i64,
        dest_x: i64,
        dest_y: i64,
    ) -> Result<(), ScnError>;
}

/// A simple uniform tile grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    cols: i64,
    rows: i64,
    tile_w: u32,
    tile_h: u32,
}

impl TileGrid {
    /// Create a grid of `cols x rows` tiles of uniform size.
    pub fn create_simple(cols: u32, rows: u32, tile_w: u32, tile_h: u32) -> Self {
        TileGrid {
            cols: cols as i64,
            rows: rows as i64,
            tile_w,
            tile_h,
        }
    }

    /// Paint the region `(x, y, w, h)` in grid-local pixels onto `dest`.
    ///
    /// Invokes `painter` once per intersected tile, in row-major order.
    /// The origin may be negative or past the grid; only tiles that
    /// actually exist are visited. Fails on the first tile failure.
    pub async fn paint_region<P: TilePainter + ?Sized>(
        &self,
        dest: &mut RegionSurface,
        painter: &P,
        x: i64,
        y: i64,
        w: u32,
        h: u32,
    ) -> Result<(), ScnError> {
        if w == 0 || h == 0 {
            return Ok(());
        }

        let tw = self.tile_w as i64;
        let th = self.tile_h as i64;

        let start_col = x.div_euclid(tw).max(0);
        let end_col = (x + w as i64 - 1).div_euclid(tw).min(self.cols - 1);
        let start_row = y.div_euclid(th).max(0);
        let end_row = (y + h as i64 - 1).div_euclid(th).min(self.rows - 1);

        for row in start_row..=end_row {
            for col in start_col..=end_col {
                let dest_x = col * tw - x;
                let dest_y = row * th - y;
                painter.paint_tile(dest, col, row, dest_x, dest_y).await?;
            }
        }

        Ok(())
    }

    /// Number of tile columns.
    pub fn cols(&self) -> i64 {
        self.cols
    }

    /// Number of tile rows.
    pub fn rows(&self) -> i64 {
        self.rows
    }
}

// =============================================================================
// Tests
// =============================================================================
