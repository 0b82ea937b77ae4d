//! Level synthesis: from a parsed collection to the output level stack.
//!
//! A slide may carry several overlapping brightfield acquisitions, each
//! with its own pyramid, all placed on one canvas by their click
//! offsets. Synthesis composes them into output levels: level k holds
//! one [`Area`] per contributing image, backed by that image's k-th
//! widest raster. The canvas is sized in clicks; each level's pixel
//! size is fixed only after every contribution has been folded into the
//! minimum `clicks_per_pixel`, so the level grid is fine enough for any
//! of its areas.

use tracing::{debug, warn};

use crate::error::ScnError;
use crate::format::tiff::{Compression, TiffDirectory, TiffInfo};
use crate::slide::{PropertyBag, PROPERTY_OBJECTIVE_POWER};
use crate::tile::TileGrid;

use super::manifest::{Collection, Image};

/// Minimum resolution similarity between coalesced rasters.
const RESOLUTION_SIMILARITY_FLOOR: f64 = 0.98;

// =============================================================================
// Output types
// =============================================================================

/// One output pyramid resolution spanning the whole canvas.
#[derive(Debug, Clone)]
pub struct Level {
    /// Level width in pixels
    pub width: i64,

    /// Level height in pixels
    pub height: i64,

    /// Downsample factor relative to level 0
    pub downsample: f64,

    /// Clicks per pixel of this level's grid
    pub clicks_per_pixel: f64,

    /// Contributing areas, in manifest order
    pub areas: Vec<Area>,
}

/// One image's contribution to one level.
#[derive(Debug, Clone)]
pub struct Area {
    /// The TIFF directory backing this area
    pub directory: TiffDirectory,

    /// Tile grid sized to the directory's layout
    pub grid: TileGrid,

    /// Canvas offset in clicks
    pub clicks_offset_x: i64,

    /// Canvas offset in clicks
    pub clicks_offset_y: i64,

    /// Stable ordinal used in tile cache keys
    pub cache_id: u32,
}

/// The macro overview chosen during synthesis.
#[derive(Debug, Clone, Copy)]
pub struct MacroImage {
    /// TIFF directory of the macro's largest raster
    pub dir: usize,

    /// Raster width in pixels
    pub width: i64,

    /// Raster height in pixels
    pub height: i64,
}

/// Everything synthesis produces besides properties.
#[derive(Debug)]
pub(crate) struct LevelStack {
    pub levels: Vec<Level>,
    pub quickhash_dir: usize,
    pub macro_image: Option<MacroImage>,
}

// =============================================================================
// Quickhash mode
// =============================================================================

/// Whether this slide hashes the smallest main-image raster.
///
/// For compatibility, slides with exactly one brightfield main image, no
/// other main images, and at most one macro hash the smallest main
/// dimension. Everything else hashes the lowest-resolution brightfield
/// macro. A single non-brightfield main image forces the macro mode
/// outright, whatever else the slide contains.
pub(crate) fn should_use_legacy_quickhash(collection: &Collection) -> bool {
    let mut brightfield_main_images = 0u32;
    let mut macro_images = 0u32;

    for image in &collection.images {
        if image.is_macro {
            macro_images += 1;
        } else {
            if !image.is_brightfield() {
                return false;
            }
            brightfield_main_images += 1;
        }
    }

    brightfield_main_images == 1 && macro_images <= 1
}

// =============================================================================
// Synthesis
// =============================================================================

/// Build the level stack from a parsed collection.
///
/// Emits the `leica.*` properties as a side effect. On any failure the
/// partially built stack is simply dropped; nothing escapes.
pub(crate) fn synthesize_levels(
    collection: &Collection,
    tiff: &TiffInfo,
    props: &mut PropertyBag,
) -> Result<LevelStack, ScnError> {
    props.set_optional("leica.barcode", collection.barcode.as_deref());

    let legacy_quickhash = should_use_legacy_quickhash(collection);
    debug!(legacy_quickhash, "quickhash mode");

    let mut levels: Vec<Level> = Vec::new();
    let mut quickhash_dir: i64 = -1;
    let mut next_cache_id: u32 = 0;
    let mut first_main: Option<&Image> = None;

    for image in &collection.images {
        if image.is_macro {
            continue;
        }
        if !image.is_brightfield() {
            warn!(
                source = image.illumination_source.as_deref().unwrap_or("<none>"),
                "skipping non-brightfield image"
            );
            continue;
        }

        let is_first = first_main.is_none();
        let first = *first_main.get_or_insert(image);

        if is_first {
            props.set_optional("leica.aperture", image.aperture.as_deref());
            props.set_optional("leica.creation-date", image.creation_date.as_deref());
            props.set_optional("leica.device-model", image.device_model.as_deref());
            props.set_optional("leica.device-version", image.device_version.as_deref());
            props.set_optional(
                "leica.illumination-source",
                image.illumination_source.as_deref(),
            );
            props.set_optional("leica.objective", image.objective.as_deref());
            props.duplicate_int_prop("leica.objective", PROPERTY_OBJECTIVE_POWER);
        }

        // Compositing only works when the acquisitions agree on optics
        // and pyramid depth
        if image.illumination_source != first.illumination_source
            || image.objective != first.objective
            || image.dimensions.len() != first.dimensions.len()
        {
            return Err(ScnError::bad_data(
                "Slides with dissimilar main images are not supported",
            ));
        }

        for (k, dimension) in image.dimensions.iter().enumerate() {
            if is_first {
                levels.push(Level {
                    width: 0,
                    height: 0,
                    downsample: 1.0,
                    clicks_per_pixel: dimension.clicks_per_pixel,
                    areas: Vec::new(),
                });
            } else {
                let level = &mut levels[k];

                // The level grid follows the densest contribution
                level.clicks_per_pixel = level.clicks_per_pixel.min(dimension.clicks_per_pixel);

                let first_dimension = &first.dimensions[k];
                let resolution_similarity = 1.0
                    - (dimension.clicks_per_pixel - first_dimension.clicks_per_pixel).abs()
                        / first_dimension.clicks_per_pixel;
                debug!(resolution_similarity, level = k, "coalescing raster");
                if resolution_similarity < RESOLUTION_SIMILARITY_FLOOR {
                    return Err(ScnError::bad_data("Inconsistent main image resolutions"));
                }
            }

            let dir = usize::try_from(dimension.dir).map_err(|_| {
                ScnError::bad_data(format!("Couldn't read TIFF directory {}", dimension.dir))
            })?;
            let directory = TiffDirectory::open(tiff, dir)?;

            let compression = tiff
                .ifd(dir)
                .and_then(|ifd| ifd.compression)
                .ok_or_else(|| ScnError::bad_data("Can't read compression scheme"))?;
            match Compression::from_u16(compression) {
                Some(codec) if codec.is_supported() => {}
                _ => {
                    return Err(ScnError::bad_data(format!(
                        "Unsupported TIFF compression: {}",
                        compression
                    )));
                }
            }

            let grid = TileGrid::create_simple(
                directory.geometry.tiles_across,
                directory.geometry.tiles_down,
                directory.geometry.tile_w,
                directory.geometry.tile_h,
            );
            debug!(
                dir,
                clicks_per_pixel = dimension.clicks_per_pixel,
                "adding area"
            );

            levels[k].areas.push(Area {
                directory,
                grid,
                clicks_offset_x: image.clicks_offset_x,
                clicks_offset_y: image.clicks_offset_y,
                cache_id: next_cache_id,
            });
            next_cache_id += 1;
        }

        if legacy_quickhash && is_first {
            if let Some(smallest) = image.dimensions.last() {
                quickhash_dir = smallest.dir;
            }
        }
    }

    if first_main.is_none() {
        return Err(ScnError::bad_data("Can't find main image"));
    }

    // Click densities are final; fix the level pixel sizes
    for level in &mut levels {
        level.width = (collection.clicks_across as f64 / level.clicks_per_pixel).ceil() as i64;
        level.height = (collection.clicks_down as f64 / level.clicks_per_pixel).ceil() as i64;
    }
    let base_width = levels[0].width as f64;
    for level in &mut levels {
        level.downsample = base_width / level.width as f64;
    }

    // Macro pass: at most one brightfield macro becomes the overview
    let mut macro_image: Option<MacroImage> = None;
    for image in &collection.images {
        if !image.is_macro {
            continue;
        }
        if !image.is_brightfield() {
            continue;
        }
        if macro_image.is_some() {
            return Err(ScnError::bad_data("Found multiple macro images"));
        }

        let largest = &image.dimensions[0];
        let dir = usize::try_from(largest.dir).map_err(|_| {
            ScnError::bad_data(format!("Couldn't read TIFF directory {}", largest.dir))
        })?;
        let directory = TiffDirectory::open(tiff, dir)?;

        macro_image = Some(MacroImage {
            dir,
            width: directory.image_w,
            height: directory.image_h,
        });

        if !legacy_quickhash {
            if let Some(smallest) = image.dimensions.last() {
                quickhash_dir = smallest.dir;
            }
        }
    }

    let quickhash_dir = usize::try_from(quickhash_dir)
        .map_err(|_| ScnError::bad_data("Couldn't locate TIFF directory for quickhash"))?;

    Ok(LevelStack {
        levels,
        quickhash_dir,
        macro_image,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::scn::manifest::Dimension;
    use crate::format::tiff::{ByteOrder, Ifd, IfdInfo, Resolution, TiffHeader, TileGeometry};

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn tiled_ifd(index: usize, w: i64, h: i64) -> IfdInfo {
        let across = ((w + 255) / 256) as u32;
        let down = ((h + 255) / 256) as u32;
        let n = (across * down) as usize;
        IfdInfo {
            index,
            size: Some((w, h)),
            compression: Some(7),
            tile: Some(TileGeometry {
                tile_w: 256,
                tile_h: 256,
                tiles_across: across,
                tiles_down: down,
                offsets: (0..n as u64)
                    .map(|i| 4096 + i * 512)
                    .collect::<Vec<_>>()
                    .into(),
                byte_counts: vec![512u64; n].into(),
                jpeg_tables: None,
            }),
            resolution: Resolution::default(),
            ifd: Ifd::empty(),
        }
    }

    /// A file whose directory d has raster size `sizes[d]`.
    fn tiff_with(sizes: &[(i64, i64)]) -> TiffInfo {
        TiffInfo {
            header: TiffHeader {
                byte_order: ByteOrder::LittleEndian,
                is_bigtiff: true,
                first_ifd_offset: 16,
            },
            ifds: sizes
                .iter()
                .enumerate()
                .map(|(i, &(w, h))| tiled_ifd(i, w, h))
                .collect(),
        }
    }

    fn dimension(dir: i64, width: i64, height: i64, image_clicks_across: i64) -> Dimension {
        Dimension {
            dir,
            width,
            height,
            clicks_per_pixel: image_clicks_across as f64 / width as f64,
        }
    }

    /// An image as the manifest parser would produce it; `is_macro` is
    /// an input here because the parser derives it before synthesis.
    fn image(
        clicks: (i64, i64),
        offset: (i64, i64),
        illumination: Option<&str>,
        objective: Option<&str>,
        is_macro: bool,
        dims: Vec<Dimension>,
    ) -> Image {
        Image {
            creation_date: Some("2021-03-12T10:15:00Z".to_string()),
            device_model: Some("Leica SCN400".to_string()),
            device_version: Some("1.5.1".to_string()),
            illumination_source: illumination.map(str::to_string),
            objective: objective.map(str::to_string),
            aperture: Some("0.75".to_string()),
            clicks_across: clicks.0,
            clicks_down: clicks.1,
            clicks_offset_x: offset.0,
            clicks_offset_y: offset.1,
            is_macro,
            dimensions: dims,
        }
    }

    /// One brightfield main image with two pyramid rasters.
    fn single_main_collection() -> Collection {
        Collection {
            barcode: Some("AB-123".to_string()),
            clicks_across: 100000,
            clicks_down: 80000,
            images: vec![image(
                (100000, 80000),
                (0, 0),
                Some("brightfield"),
                Some("40"),
                false,
                vec![
                    dimension(1, 1000, 800, 100000),
                    dimension(2, 500, 400, 100000),
                ],
            )],
        }
    }

    fn whole_slide_macro(dirs: (i64, i64)) -> Image {
        image(
            (100000, 80000),
            (0, 0),
            Some("brightfield"),
            None,
            true,
            vec![
                dimension(dirs.0, 400, 320, 100000),
                dimension(dirs.1, 200, 160, 100000),
            ],
        )
    }

    // -------------------------------------------------------------------------
    // Legacy quickhash truth table
    // -------------------------------------------------------------------------

    #[test]
    fn test_legacy_quickhash_single_main() {
        // 1 brightfield main, 0 macros
        let mut collection = single_main_collection();
        assert!(should_use_legacy_quickhash(&collection));

        // 1 brightfield main, 1 brightfield macro
        collection.images.push(whole_slide_macro((10, 11)));
        assert!(should_use_legacy_quickhash(&collection));

        // A second macro breaks the limit
        collection.images.push(whole_slide_macro((12, 13)));
        assert!(!should_use_legacy_quickhash(&collection));
    }

    #[test]
    fn test_legacy_quickhash_two_mains() {
        let mut collection = single_main_collection();
        collection.images.push(image(
            (100000, 80000),
            (50000, 0),
            Some("brightfield"),
            Some("40"),
            false,
            vec![
                dimension(3, 1000, 800, 100000),
                dimension(4, 500, 400, 100000),
            ],
        ));
        assert!(!should_use_legacy_quickhash(&collection));
    }

    #[test]
    fn test_legacy_quickhash_non_brightfield_main() {
        let mut collection = single_main_collection();
        collection.images.push(image(
            (100000, 80000),
            (50000, 0),
            Some("fluorescence"),
            Some("40"),
            false,
            vec![dimension(3, 1000, 800, 100000)],
        ));
        assert!(!should_use_legacy_quickhash(&collection));

        // Missing illumination source counts as non-brightfield
        let mut collection = single_main_collection();
        collection.images[0].illumination_source = None;
        assert!(!should_use_legacy_quickhash(&collection));
    }

    // -------------------------------------------------------------------------
    // Synthesis scenarios
    // -------------------------------------------------------------------------

    #[test]
    fn test_single_main_no_macro() {
        let collection = single_main_collection();
        let tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400)]);
        let mut props = PropertyBag::new();

        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();

        assert_eq!(stack.levels.len(), 2);
        assert_eq!(stack.levels[0].width, 1000);
        assert_eq!(stack.levels[0].height, 800);
        assert_eq!(stack.levels[0].clicks_per_pixel, 100.0);
        assert_eq!(stack.levels[0].downsample, 1.0);
        assert_eq!(stack.levels[1].width, 500);
        assert_eq!(stack.levels[1].height, 400);
        assert_eq!(stack.levels[1].clicks_per_pixel, 200.0);
        assert_eq!(stack.levels[1].downsample, 2.0);

        assert_eq!(stack.levels[0].areas.len(), 1);
        assert_eq!(stack.levels[0].areas[0].directory.dir, 1);
        assert_eq!(stack.levels[1].areas[0].directory.dir, 2);

        // Legacy mode: smallest main raster
        assert_eq!(stack.quickhash_dir, 2);
        assert!(stack.macro_image.is_none());

        // Cache ids are distinct
        assert_ne!(
            stack.levels[0].areas[0].cache_id,
            stack.levels[1].areas[0].cache_id
        );
    }

    #[test]
    fn test_properties_from_first_main() {
        let collection = single_main_collection();
        let tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400)]);
        let mut props = PropertyBag::new();

        synthesize_levels(&collection, &tiff, &mut props).unwrap();

        assert_eq!(props.get("leica.barcode"), Some("AB-123"));
        assert_eq!(props.get("leica.aperture"), Some("0.75"));
        assert_eq!(
            props.get("leica.creation-date"),
            Some("2021-03-12T10:15:00Z")
        );
        assert_eq!(props.get("leica.device-model"), Some("Leica SCN400"));
        assert_eq!(props.get("leica.device-version"), Some("1.5.1"));
        assert_eq!(props.get("leica.illumination-source"), Some("brightfield"));
        assert_eq!(props.get("leica.objective"), Some("40"));
        assert_eq!(props.get(PROPERTY_OBJECTIVE_POWER), Some("40"));
    }

    #[test]
    fn test_main_plus_macro() {
        let mut collection = single_main_collection();
        collection.images.push(whole_slide_macro((10, 11)));
        let mut sizes = vec![(64, 64), (1000, 800), (500, 400)];
        sizes.resize(11, (0, 0));
        sizes[10] = (400, 320);
        let tiff = tiff_with(&sizes);
        let mut props = PropertyBag::new();

        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();

        // Still legacy: quickhash from the main image, not the macro
        assert_eq!(stack.quickhash_dir, 2);

        let macro_image = stack.macro_image.unwrap();
        assert_eq!(macro_image.dir, 10);
        assert_eq!(macro_image.width, 400);
        assert_eq!(macro_image.height, 320);
    }

    #[test]
    fn test_two_overlapping_mains() {
        let collection = Collection {
            barcode: None,
            clicks_across: 200000,
            clicks_down: 100000,
            images: vec![
                image(
                    (100000, 100000),
                    (0, 0),
                    Some("brightfield"),
                    Some("20"),
                    false,
                    vec![
                        dimension(1, 1000, 1000, 100000),
                        dimension(2, 500, 500, 100000),
                    ],
                ),
                image(
                    (100000, 100000),
                    (100000, 0),
                    Some("brightfield"),
                    Some("20"),
                    false,
                    vec![
                        dimension(3, 1000, 1000, 100000),
                        dimension(4, 500, 500, 100000),
                    ],
                ),
            ],
        };
        let tiff = tiff_with(&[
            (64, 64),
            (1000, 1000),
            (500, 500),
            (1000, 1000),
            (500, 500),
        ]);
        let mut props = PropertyBag::new();

        // Two mains force macro-based quickhash, and there is no macro
        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("quickhash"));

        // With a macro present the same slide synthesizes fine
        let mut collection = collection;
        collection.images.push(image(
            (200000, 100000),
            (0, 0),
            Some("brightfield"),
            None,
            true,
            vec![dimension(5, 400, 200, 200000)],
        ));
        let tiff = tiff_with(&[
            (64, 64),
            (1000, 1000),
            (500, 500),
            (1000, 1000),
            (500, 500),
            (400, 200),
        ]);
        let mut props = PropertyBag::new();
        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();

        assert_eq!(stack.levels.len(), 2);
        assert_eq!(stack.levels[0].areas.len(), 2);
        assert_eq!(stack.levels[1].areas.len(), 2);
        assert_eq!(stack.levels[0].clicks_per_pixel, 100.0);
        assert_eq!(stack.levels[1].clicks_per_pixel, 200.0);
        assert_eq!(stack.levels[0].width, 2000);
        assert_eq!(stack.levels[1].width, 1000);
        assert_eq!(stack.levels[0].areas[1].clicks_offset_x, 100000);
        // Non-legacy: quickhash from the macro's smallest raster
        assert_eq!(stack.quickhash_dir, 5);
    }

    #[test]
    fn test_dissimilar_objectives_rejected() {
        let mut collection = single_main_collection();
        collection.clicks_across = 200000;
        collection.images.push(image(
            (100000, 80000),
            (100000, 0),
            Some("brightfield"),
            Some("20"),
            false,
            vec![
                dimension(3, 1000, 800, 100000),
                dimension(4, 500, 400, 100000),
            ],
        ));
        let tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400), (1000, 800), (500, 400)]);
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("dissimilar"));
    }

    #[test]
    fn test_dissimilar_pyramid_depth_rejected() {
        let mut collection = single_main_collection();
        collection.clicks_across = 200000;
        collection.images.push(image(
            (100000, 80000),
            (100000, 0),
            Some("brightfield"),
            Some("40"),
            false,
            vec![dimension(3, 1000, 800, 100000)],
        ));
        let tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400), (1000, 800)]);
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("dissimilar"));
    }

    /// Two mains plus a macro; the second main covers `second_clicks`
    /// clicks with the same 1000-pixel raster, shifting its
    /// clicks-per-pixel relative to the first image's 100.0.
    fn two_mains_with_second_clicks(second_clicks: i64) -> Result<LevelStack, ScnError> {
        let collection = Collection {
            barcode: None,
            clicks_across: 200000,
            clicks_down: 100000,
            images: vec![
                image(
                    (100000, 100000),
                    (0, 0),
                    Some("brightfield"),
                    Some("20"),
                    false,
                    vec![dimension(1, 1000, 1000, 100000)],
                ),
                image(
                    (second_clicks, 100000),
                    (100000, 0),
                    Some("brightfield"),
                    Some("20"),
                    false,
                    vec![dimension(2, 1000, 1000, second_clicks)],
                ),
                image(
                    (200000, 100000),
                    (0, 0),
                    Some("brightfield"),
                    None,
                    true,
                    vec![dimension(3, 400, 200, 200000)],
                ),
            ],
        };
        let tiff = tiff_with(&[(64, 64), (1000, 1000), (1000, 1000), (400, 200)]);
        let mut props = PropertyBag::new();
        synthesize_levels(&collection, &tiff, &mut props)
    }

    #[test]
    fn test_resolution_similarity_threshold() {
        // 102 vs 100 clicks/pixel: similarity exactly 0.98, accepted
        let stack = two_mains_with_second_clicks(102000).unwrap();
        // The denser grid (fewer clicks per pixel) wins the level
        assert_eq!(stack.levels[0].clicks_per_pixel, 100.0);

        // 103 vs 100: similarity 0.97, rejected
        let err = two_mains_with_second_clicks(103000).unwrap_err();
        assert!(err.to_string().contains("resolutions"));

        // The minimum also follows a denser second image: 98 vs 100
        let stack = two_mains_with_second_clicks(98000).unwrap();
        assert_eq!(stack.levels[0].clicks_per_pixel, 98.0);
    }

    #[test]
    fn test_unsupported_compression() {
        let collection = single_main_collection();
        let mut tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400)]);
        tiff.ifds[1].compression = Some(5);
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported TIFF compression: 5");
    }

    #[test]
    fn test_missing_compression() {
        let collection = single_main_collection();
        let mut tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400)]);
        tiff.ifds[1].compression = None;
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("compression scheme"));
    }

    #[test]
    fn test_no_main_image() {
        // Only a macro: nothing to composite
        let collection = Collection {
            barcode: None,
            clicks_across: 100000,
            clicks_down: 80000,
            images: vec![whole_slide_macro((1, 2))],
        };
        let tiff = tiff_with(&[(64, 64), (400, 320), (200, 160)]);
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("main image"));
    }

    #[test]
    fn test_multiple_macros_rejected() {
        let mut collection = single_main_collection();
        collection.images.push(whole_slide_macro((10, 11)));
        collection.images.push(whole_slide_macro((12, 13)));
        let mut sizes = vec![(64, 64), (1000, 800), (500, 400)];
        sizes.resize(14, (400, 320));
        let tiff = tiff_with(&sizes);
        let mut props = PropertyBag::new();

        let err = synthesize_levels(&collection, &tiff, &mut props).unwrap_err();
        assert!(err.to_string().contains("multiple macro"));
    }

    #[test]
    fn test_non_brightfield_macro_skipped_silently() {
        let mut collection = single_main_collection();
        let mut fluoro_macro = whole_slide_macro((10, 11));
        fluoro_macro.illumination_source = Some("fluorescence".to_string());
        collection.images.push(fluoro_macro);
        let mut sizes = vec![(64, 64), (1000, 800), (500, 400)];
        sizes.resize(12, (400, 320));
        let tiff = tiff_with(&sizes);
        let mut props = PropertyBag::new();

        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();
        assert!(stack.macro_image.is_none());
        // The macro count still keeps legacy mode; quickhash stays on
        // the smallest main raster
        assert_eq!(stack.quickhash_dir, 2);
    }

    #[test]
    fn test_levels_sorted_by_descending_width() {
        let collection = single_main_collection();
        let tiff = tiff_with(&[(64, 64), (1000, 800), (500, 400)]);
        let mut props = PropertyBag::new();

        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();
        for pair in stack.levels.windows(2) {
            assert!(pair[0].width > pair[1].width);
        }
    }

    #[test]
    fn test_level_size_is_ceil_of_clicks() {
        // 300 clicks/pixel over a 100000x80000 canvas: 333.3 and 266.7
        // pixels round up
        let collection = Collection {
            barcode: None,
            clicks_across: 100000,
            clicks_down: 80000,
            images: vec![image(
                (99900, 79900),
                (10, 10),
                Some("brightfield"),
                Some("40"),
                false,
                vec![dimension(1, 333, 266, 99900)],
            )],
        };
        let tiff = tiff_with(&[(64, 64), (333, 266)]);
        let mut props = PropertyBag::new();

        let stack = synthesize_levels(&collection, &tiff, &mut props).unwrap();
        assert_eq!(stack.levels[0].width, 334);
        assert_eq!(stack.levels[0].height, 267);
    }
}
