//! TIFF directory walking and per-directory tile geometry.
//!
//! A slide file is a chain of IFDs, each addressing one raster. Unlike
//! generic pyramidal TIFF readers there is no guessing here about which
//! IFD is a pyramid level: the Leica manifest names directories by index,
//! so this module only summarizes every IFD in the chain and hands out
//! tile geometry for the directories the manifest asks for.

use std::sync::Arc;

use crate::error::{ScnError, TiffError};
use crate::io::RangeReader;

use super::ifd::Ifd;
use super::parser::{TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

/// Safety limit on the number of IFDs to walk.
const MAX_IFDS: usize = 100;

// =============================================================================
// Per-IFD summary
// =============================================================================

/// Resolution metadata of one IFD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resolution {
    /// XResolution in pixels per unit
    pub x: Option<f64>,

    /// YResolution in pixels per unit
    pub y: Option<f64>,

    /// ResolutionUnit (1=none, 2=inch, 3=centimeter)
    pub unit: Option<u16>,
}

/// Tile organization of one IFD.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGeometry {
    /// Tile width in pixels
    pub tile_w: u32,

    /// Tile height in pixels
    pub tile_h: u32,

    /// Number of tile columns
    pub tiles_across: u32,

    /// Number of tile rows
    pub tiles_down: u32,

    /// Byte offset of each tile, row-major
    pub offsets: Arc<[u64]>,

    /// Byte count of each tile, row-major
    pub byte_counts: Arc<[u64]>,

    /// JPEG tables for abbreviated tile streams, when present
    pub jpeg_tables: Option<bytes::Bytes>,
}

/// Summary of one IFD in the file.
#[derive(Debug, Clone)]
pub struct IfdInfo {
    /// Position in the IFD chain; this is the directory index the
    /// manifest's `ifd` attribute refers to
    pub index: usize,

    /// ImageWidth / ImageLength, when both are present
    pub size: Option<(i64, i64)>,

    /// Raw Compression tag value, when present
    pub compression: Option<u16>,

    /// Tile organization, when the IFD is tiled
    pub tile: Option<TileGeometry>,

    /// Resolution tags
    pub resolution: Resolution,

    /// The raw IFD, for on-demand tag reads (ImageDescription)
    pub ifd: Ifd,
}

// =============================================================================
// TiffInfo
// =============================================================================

/// Parsed structure of the whole file: header plus one summary per IFD.
///
/// Built once when the slide is opened and shared read-only between all
/// handles afterwards.
#[derive(Debug)]
pub struct TiffInfo {
    /// The TIFF header
    pub header: TiffHeader,

    /// Summaries in chain order
    pub ifds: Vec<IfdInfo>,
}

impl TiffInfo {
    /// Walk the IFD chain and summarize every directory.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        // A short read here means a short file; let the header parser
        // report that rather than the I/O layer
        let header_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            let count_size = header.ifd_count_size();
            let count_bytes = reader.read_exact_at(offset, count_size).await?;

            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, &header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, &header)?;

            let next_offset = ifd.next_ifd_offset;
            let info = Self::summarize_ifd(reader, &header, ifd, ifds.len()).await?;
            ifds.push(info);

            offset = next_offset;
        }

        Ok(TiffInfo { header, ifds })
    }

    /// Build the summary for one parsed IFD.
    async fn summarize_ifd<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: Ifd,
        index: usize,
    ) -> Result<IfdInfo, TiffError> {
        let byte_order = header.byte_order;
        let values = ValueReader::new(reader, header);

        let width = ifd.u32_value(TiffTag::ImageWidth, byte_order);
        let height = ifd.u32_value(TiffTag::ImageLength, byte_order);
        let size = match (width, height) {
            (Some(w), Some(h)) => Some((w as i64, h as i64)),
            _ => None,
        };

        let compression = ifd.u16_value(TiffTag::Compression, byte_order);

        let tile = Self::load_tile_geometry(&values, &ifd, byte_order, size).await?;

        // Resolution metadata is best-effort; an oddly typed tag is
        // treated as absent rather than failing the whole parse
        let mut resolution = Resolution {
            unit: ifd.u16_value(TiffTag::ResolutionUnit, byte_order),
            ..Resolution::default()
        };
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::XResolution) {
            resolution.x = values.read_rational(entry).await.ok().flatten();
        }
        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::YResolution) {
            resolution.y = values.read_rational(entry).await.ok().flatten();
        }

        Ok(IfdInfo {
            index,
            size,
            compression,
            tile,
            resolution,
            ifd,
        })
    }

    /// Load tile geometry for an IFD, or `None` when it is not tiled.
    ///
    /// The offset and byte-count arrays are loaded eagerly; they are
    /// needed for every tile read and for quickhashing, and each is one
    /// range request.
    async fn load_tile_geometry<R: RangeReader>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
        byte_order: super::parser::ByteOrder,
        size: Option<(i64, i64)>,
    ) -> Result<Option<TileGeometry>, TiffError> {
        let tile_w = match ifd.u32_value(TiffTag::TileWidth, byte_order) {
            Some(w) if w > 0 => w,
            _ => return Ok(None),
        };
        let tile_h = match ifd.u32_value(TiffTag::TileLength, byte_order) {
            Some(h) if h > 0 => h,
            _ => return Ok(None),
        };
        let (offsets_entry, counts_entry) = match (
            ifd.get_entry_by_tag(TiffTag::TileOffsets),
            ifd.get_entry_by_tag(TiffTag::TileByteCounts),
        ) {
            (Some(o), Some(c)) => (o, c),
            _ => return Ok(None),
        };
        let (width, height) = match size {
            Some(s) => s,
            None => return Ok(None),
        };

        let tiles_across = ((width as u64 + tile_w as u64 - 1) / tile_w as u64) as u32;
        let tiles_down = ((height as u64 + tile_h as u64 - 1) / tile_h as u64) as u32;

        let offsets: Arc<[u64]> = values.read_u64_array(offsets_entry).await?.into();
        let byte_counts: Arc<[u64]> = values.read_u64_array(counts_entry).await?.into();

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(Some(TileGeometry {
            tile_w,
            tile_h,
            tiles_across,
            tiles_down,
            offsets,
            byte_counts,
            jpeg_tables,
        }))
    }

    /// Get an IFD summary by directory index.
    pub fn ifd(&self, dir: usize) -> Option<&IfdInfo> {
        self.ifds.get(dir)
    }

    /// Number of directories in the file.
    pub fn directory_count(&self) -> usize {
        self.ifds.len()
    }
}

// =============================================================================
// TiffDirectory
// =============================================================================

/// One directory's raster, ready for tile reads.
///
/// Cheap to clone: the tile arrays are shared.
#[derive(Debug, Clone)]
pub struct TiffDirectory {
    /// Directory index in the IFD chain
    pub dir: usize,

    /// Raster width in pixels
    pub image_w: i64,

    /// Raster height in pixels
    pub image_h: i64,

    /// Tile layout and location arrays
    pub geometry: TileGeometry,
}

impl TiffDirectory {
    /// Select and examine a directory for tile access.
    ///
    /// Fails with `BadData` when the directory doesn't exist, has no
    /// image size, is not tile-organized, or declares fewer tile
    /// locations than its layout requires.
    pub fn open(info: &TiffInfo, dir: usize) -> Result<Self, ScnError> {
        let ifd = info
            .ifd(dir)
            .ok_or_else(|| ScnError::bad_data(format!("Couldn't read TIFF directory {}", dir)))?;

        let (image_w, image_h) = ifd.size.ok_or_else(|| {
            ScnError::bad_data(format!("TIFF directory {} has no image size", dir))
        })?;

        let geometry = ifd
            .tile
            .clone()
            .ok_or_else(|| ScnError::bad_data(format!("TIFF directory {} is not tiled", dir)))?;

        let tile_count = geometry.tiles_across as usize * geometry.tiles_down as usize;
        if geometry.offsets.len() < tile_count || geometry.byte_counts.len() < tile_count {
            return Err(ScnError::bad_data(format!(
                "TIFF directory {} declares {} tiles but stores {} locations",
                dir,
                tile_count,
                geometry.offsets.len().min(geometry.byte_counts.len())
            )));
        }

        Ok(TiffDirectory {
            dir,
            image_w,
            image_h,
            geometry,
        })
    }

    /// File location `(offset, byte_count)` of a tile.
    ///
    /// Returns `None` for out-of-range coordinates.
    pub fn tile_location(&self, tile_col: i64, tile_row: i64) -> Option<(u64, u64)> {
        if tile_col < 0
            || tile_row < 0
            || tile_col >= self.geometry.tiles_across as i64
            || tile_row >= self.geometry.tiles_down as i64
        {
            return None;
        }
        let index = tile_row as usize * self.geometry.tiles_across as usize + tile_col as usize;
        Some((self.geometry.offsets[index], self.geometry.byte_counts[index]))
    }

    /// Pixel size of the valid (unpadded) part of a tile.
    ///
    /// Edge tiles extend past the raster; the padding must be clipped to
    /// transparent after decoding.
    pub fn tile_valid_size(&self, tile_col: i64, tile_row: i64) -> (u32, u32) {
        let tw = self.geometry.tile_w as i64;
        let th = self.geometry.tile_h as i64;
        let w = (self.image_w - tile_col * tw).clamp(0, tw) as u32;
        let h = (self.image_h - tile_row * th).clamp(0, th) as u32;
        (w, h)
    }
}

// =============================================================================
// Tests
// =============================================================================
