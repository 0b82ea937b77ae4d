//! The Leica SCN slide reader.
//!
//! `ScnReader::open` is the whole recognition and assembly pipeline:
//! parse the TIFF structure, gate on the Leica namespace, parse the
//! manifest, synthesize the level stack, seed properties and the
//! quickhash, then discard the manifest tree. After open the reader is
//! immutable; any number of tasks may paint regions concurrently, each
//! holding one pooled TIFF handle for the duration of its call.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ReaderOptions;
use crate::error::ScnError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::format::tiff::{TiffDirectory, TiffFile, TiffPool};
use crate::slide::{
    init_properties_and_hash, set_resolution_prop, AssociatedImageInfo, LevelInfo, PropertyBag,
    SlideReader, PROPERTY_COMMENT, PROPERTY_MPP_X, PROPERTY_MPP_Y, PROPERTY_QUICKHASH,
    PROPERTY_TIFF_IMAGE_DESCRIPTION, PROPERTY_VENDOR,
};
use crate::tile::{RegionSurface, TileBuf, TileCache, TileKey, TilePainter};

use super::levels::{Area, Level, MacroImage};
use super::manifest::{contains_leica_namespace, parse_manifest};

/// Name of the macro associated image.
const MACRO_IMAGE_NAME: &str = "macro";

// =============================================================================
// ScnReader
// =============================================================================

/// An opened Leica SCN slide.
pub struct ScnReader {
    slide_id: Arc<str>,
    pool: TiffPool,
    levels: Vec<Level>,
    properties: PropertyBag,
    macro_image: Option<MacroImage>,
    tile_cache: Arc<TileCache>,
}

impl std::fmt::Debug for ScnReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScnReader")
            .field("slide_id", &self.slide_id)
            .finish_non_exhaustive()
    }
}

impl ScnReader {
    /// Open a slide with default options.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ScnError> {
        Self::open_with_options(path, ReaderOptions::default()).await
    }

    /// Open a slide, creating a private tile cache from the options.
    pub async fn open_with_options(
        path: impl AsRef<Path>,
        options: ReaderOptions,
    ) -> Result<Self, ScnError> {
        let tile_cache = Arc::new(TileCache::with_capacity(options.cache_tiles));
        Self::open_with_cache(path, options, tile_cache).await
    }

    /// Open a slide against a shared tile cache.
    ///
    /// Use this to let several readers compete for one pixel budget.
    pub async fn open_with_cache(
        path: impl AsRef<Path>,
        options: ReaderOptions,
        tile_cache: Arc<TileCache>,
    ) -> Result<Self, ScnError> {
        options.validate().map_err(ScnError::bad_data)?;

        let path = path.as_ref();
        let slide_id: Arc<str> = Arc::from(path.display().to_string());

        let pool = TiffPool::open(
            path,
            options.max_handles,
            options.block_size,
            options.cache_blocks,
        )
        .await?;

        let info = pool.info().clone();
        let handle = pool.get().await?;

        // Recognition gates: a tiled TIFF whose first directory carries
        // the Leica manifest
        let first_ifd = info
            .ifd(0)
            .ok_or_else(|| ScnError::not_supported("TIFF has no directories"))?;
        if first_ifd.tile.is_none() {
            return Err(ScnError::not_supported("TIFF is not tiled"));
        }

        let description = handle
            .read_description(0)
            .await?
            .ok_or_else(|| ScnError::not_supported("Not a Leica slide"))?;
        if !contains_leica_namespace(&description) {
            return Err(ScnError::not_supported("Not a Leica slide"));
        }

        let collection = parse_manifest(&description)?;

        let mut properties = PropertyBag::new();
        let stack = super::levels::synthesize_levels(&collection, &info, &mut properties)?;
        // The manifest tree has served its purpose
        drop(collection);

        let property_dir = stack.levels[0].areas[0].directory.dir;
        init_properties_and_hash(&mut properties, &handle, stack.quickhash_dir, property_dir)
            .await?;

        // The raw XML stays out of the property bag
        properties.remove(PROPERTY_COMMENT);
        properties.remove(PROPERTY_TIFF_IMAGE_DESCRIPTION);

        if let Some(ifd) = info.ifd(property_dir) {
            set_resolution_prop(
                &mut properties,
                PROPERTY_MPP_X,
                ifd.resolution.x,
                ifd.resolution.unit,
            );
            set_resolution_prop(
                &mut properties,
                PROPERTY_MPP_Y,
                ifd.resolution.y,
                ifd.resolution.unit,
            );
        }

        properties.set(PROPERTY_VENDOR, "leica");
        for (k, level) in stack.levels.iter().enumerate() {
            properties.set(
                format!("openslide.level[{}].width", k),
                level.width.to_string(),
            );
            properties.set(
                format!("openslide.level[{}].height", k),
                level.height.to_string(),
            );
            properties.set(
                format!("openslide.level[{}].downsample", k),
                format!("{}", level.downsample),
            );
        }

        drop(handle);

        Ok(ScnReader {
            slide_id,
            pool,
            levels: stack.levels,
            properties,
            macro_image: stack.macro_image,
            tile_cache,
        })
    }

    /// The slide identifier (its path).
    pub fn slide_id(&self) -> &str {
        &self.slide_id
    }

    /// The synthesized levels.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// The quickhash identifier of this slide.
    pub fn quickhash(&self) -> Option<&str> {
        self.properties.get(PROPERTY_QUICKHASH)
    }

    /// The tile cache serving this reader.
    pub fn tile_cache(&self) -> &Arc<TileCache> {
        &self.tile_cache
    }
}

#[async_trait]
impl SlideReader for ScnReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).map(|l| LevelInfo {
            width: l.width,
            height: l.height,
            downsample: l.downsample,
            areas: l.areas.len(),
        })
    }

    fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn associated_images(&self) -> Vec<AssociatedImageInfo> {
        self.macro_image
            .iter()
            .map(|m| AssociatedImageInfo {
                name: MACRO_IMAGE_NAME.to_string(),
                width: m.width,
                height: m.height,
            })
            .collect()
    }

    async fn paint_region(
        &self,
        dest: &mut RegionSurface,
        x: i64,
        y: i64,
        level: usize,
        w: u32,
        h: u32,
    ) -> Result<(), ScnError> {
        let l = self
            .levels
            .get(level)
            .ok_or_else(|| ScnError::bad_data(format!("Invalid level {}", level)))?;

        debug!(x, y, level, w, h, "painting region");

        let tiff = self.pool.get().await?;

        for area in &l.areas {
            tiff.ensure_directory(area.directory.dir)?;

            // Translate level-0 canvas pixels into this area's pixel grid
            let ax = (x as f64 / l.downsample
                - area.clicks_offset_x as f64 / l.clicks_per_pixel) as i64;
            let ay = (y as f64 / l.downsample
                - area.clicks_offset_y as f64 / l.clicks_per_pixel) as i64;

            let file: &TiffFile = &tiff;
            let args = ReadTileArgs {
                tiff: file,
                area,
                cache: &self.tile_cache,
                slide: &self.slide_id,
            };
            area.grid.paint_region(dest, &args, ax, ay, w, h).await?;
        }

        Ok(())
    }

    async fn read_associated_image(&self, name: &str) -> Result<RegionSurface, ScnError> {
        let macro_image = match (&self.macro_image, name) {
            (Some(m), MACRO_IMAGE_NAME) => m,
            _ => {
                return Err(ScnError::bad_data(format!(
                    "No associated image named '{}'",
                    name
                )));
            }
        };

        let tiff = self.pool.get().await?;
        let directory = TiffDirectory::open(tiff.info(), macro_image.dir)?;

        let mut surface = RegionSurface::new(directory.image_w as u32, directory.image_h as u32);
        let tile_w = directory.geometry.tile_w as i64;
        let tile_h = directory.geometry.tile_h as i64;

        for row in 0..directory.geometry.tiles_down as i64 {
            for col in 0..directory.geometry.tiles_across as i64 {
                let tile = decode_tile(&tiff, &directory, col, row).await?;
                surface.blit(
                    &tile.pixels,
                    tile.width,
                    tile.height,
                    col * tile_w,
                    row * tile_h,
                );
            }
        }

        Ok(surface)
    }
}

// =============================================================================
// Tile reading
// =============================================================================

/// Per-paint context for the grid's tile callback.
///
/// Built fresh for every `paint_region` call so areas never hold
/// references back into the reader.
struct ReadTileArgs<'a> {
    tiff: &'a TiffFile,
    area: &'a Area,
    cache: &'a TileCache,
    slide: &'a Arc<str>,
}

#[async_trait]
impl TilePainter for ReadTileArgs<'_> {
    async fn paint_tile(
        &self,
        dest: &mut RegionSurface,
        tile_col: i64,
        tile_row: i64,
        dest_x: i64,
        dest_y: i64,
    ) -> Result<(), ScnError> {
        let key = TileKey::new(self.slide.clone(), self.area.cache_id, tile_col, tile_row);

        let tile = match self.cache.get(&key).await {
            Some(tile) => tile,
            None => {
                let tile = decode_tile(self.tiff, &self.area.directory, tile_col, tile_row).await?;
                self.cache.put(key, tile).await
            }
        };

        dest.blit(&tile.pixels, tile.width, tile.height, dest_x, dest_y);
        Ok(())
    }
}

/// Read and decode one tile into a full-size RGBA buffer.
///
/// Edge tiles are clipped to the directory's image size; the padding
/// beyond it becomes transparent. Holes (zero-length tiles) decode as a
/// fully transparent tile.
async fn decode_tile(
    tiff: &TiffFile,
    directory: &TiffDirectory,
    tile_col: i64,
    tile_row: i64,
) -> Result<TileBuf, ScnError> {
    let tile_w = directory.geometry.tile_w;
    let tile_h = directory.geometry.tile_h;
    let mut pixels = vec![0u8; tile_w as usize * tile_h as usize * 4];

    let raw = tiff.read_raw_tile(directory, tile_col, tile_row).await?;
    if !raw.is_empty() {
        let jpeg = prepare_tile_jpeg(directory.geometry.jpeg_tables.as_deref(), &raw);
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .map_err(|e| {
                ScnError::bad_data(format!(
                    "Couldn't decode tile ({}, {}) of directory {}: {}",
                    tile_col, tile_row, directory.dir, e
                ))
            })?
            .into_rgba8();

        let copy_w = decoded.width().min(tile_w) as usize;
        let copy_h = decoded.height().min(tile_h) as usize;
        let src = decoded.as_raw();
        let src_stride = decoded.width() as usize * 4;
        let dst_stride = tile_w as usize * 4;
        for y in 0..copy_h {
            let s = y * src_stride;
            let d = y * dst_stride;
            pixels[d..d + copy_w * 4].copy_from_slice(&src[s..s + copy_w * 4]);
        }

        let (valid_w, valid_h) = directory.tile_valid_size(tile_col, tile_row);
        if valid_w < tile_w || valid_h < tile_h {
            clip_tile(&mut pixels, tile_w, tile_h, valid_w, valid_h);
        }
    }

    Ok(TileBuf::new(tile_w, tile_h, pixels))
}

/// Zero out the padding beyond the valid part of an edge tile.
fn clip_tile(pixels: &mut [u8], tile_w: u32, tile_h: u32, valid_w: u32, valid_h: u32) {
    let stride = tile_w as usize * 4;
    for y in 0..tile_h as usize {
        let row = y * stride;
        if y >= valid_h as usize {
            pixels[row..row + stride].fill(0);
        } else {
            pixels[row + valid_w as usize * 4..row + stride].fill(0);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
