//! JPEG encoding of painted surfaces.
//!
//! Used by the CLI to write painted regions and associated images to
//! disk. JPEG has no alpha channel, so the straight-alpha surface is
//! flattened onto a white background first; brightfield slides are
//! white where there is no tissue, which keeps uncovered canvas
//! indistinguishable from background.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::ScnError;

use super::surface::RegionSurface;

/// Default JPEG quality for encoded output.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum valid JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum valid JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Check if a quality value is in the valid range.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp a quality value into the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

/// Encode a painted surface as JPEG.
///
/// Transparent and semi-transparent pixels are composited over white
/// before encoding.
pub fn encode_jpeg(surface: &RegionSurface, quality: u8) -> Result<Vec<u8>, ScnError> {
    if !is_valid_quality(quality) {
        return Err(ScnError::bad_data(format!(
            "JPEG quality must be between {} and {}, got {}",
            MIN_JPEG_QUALITY, MAX_JPEG_QUALITY, quality
        )));
    }

    let rgb = flatten_to_rgb(surface);

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(
            &rgb,
            surface.width(),
            surface.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ScnError::bad_data(format!("Couldn't encode JPEG: {}", e)))?;

    Ok(out)
}

/// Flatten straight-alpha RGBA onto a white background, yielding RGB8.
fn flatten_to_rgb(surface: &RegionSurface) -> Vec<u8> {
    let pixels = surface.pixels();
    let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);

    for px in pixels.chunks_exact(4) {
        let a = px[3] as u32;
        if a == 255 {
            rgb.extend_from_slice(&px[0..3]);
        } else {
            for c in 0..3 {
                let v = (px[c] as u32 * a + 255 * (255 - a)) / 255;
                rgb.push(v as u8);
            }
        }
    }

    rgb
}

// =============================================================================
// Tests
// =============================================================================
