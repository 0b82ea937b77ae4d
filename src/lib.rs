//! # scn-reader
//!
//! A reader for Leica SCN whole slide images.
//!
//! A Leica slide is a BigTIFF container whose `ImageDescription` holds
//! an XML manifest describing a "collection": one or more acquired
//! images, each a pyramid of TIFF directories, placed on a common
//! virtual canvas by sub-pixel "click" offsets. This crate recognizes
//! such slides, validates the manifest, composes the possibly
//! overlapping acquisitions into one multi-resolution level stack, and
//! serves arbitrary pixel regions from it through a cached tile reader.
//!
//! ## Architecture
//!
//! - [`io`] - positional file reads with block caching
//! - [`mod@format`] - the TIFF container layer and the SCN format itself
//! - [`slide`] - the format-agnostic reader interface and property bag
//! - [`tile`] - tile cache, grids, and region surfaces
//! - [`config`] - resource sizing for opened slides
//!
//! ## Example
//!
//! ```rust,no_run
//! use scn_reader::{RegionSurface, ScnReader, SlideReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scn_reader::ScnError> {
//!     let reader = ScnReader::open("slide.scn").await?;
//!
//!     let (width, height) = reader.dimensions().unwrap();
//!     println!("{}x{} pixels, {} levels", width, height, reader.level_count());
//!
//!     // Paint a 512x512 region from level 0
//!     let mut surface = RegionSurface::new(512, 512);
//!     reader.paint_region(&mut surface, 0, 0, 0, 512, 512).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::ReaderOptions;
pub use error::{IoError, ScnError, TiffError};
pub use format::scn::{Collection, Dimension, Image, ScnReader, LEICA_XMLNS};
pub use format::tiff::{TiffDirectory, TiffInfo, TiffPool};
pub use io::{BlockCache, FileRangeReader, RangeReader};
pub use slide::{
    AssociatedImageInfo, LevelInfo, PropertyBag, SlideReader, PROPERTY_MPP_X, PROPERTY_MPP_Y,
    PROPERTY_OBJECTIVE_POWER, PROPERTY_QUICKHASH, PROPERTY_VENDOR,
};
pub use tile::{RegionSurface, TileCache, TileKey};
