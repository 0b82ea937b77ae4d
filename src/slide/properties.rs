//! Slide properties and the quickhash.
//!
//! Every reader carries a string-keyed property bag describing the
//! slide: vendor fields, objective power, microns per pixel, and a
//! reproducible identifier (`openslide.quickhash-1`) computed from a
//! designated TIFF directory's tile data. The bag is written only while
//! the slide is opened and read-only afterwards.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ScnError;
use crate::format::tiff::{TiffDirectory, TiffFile, RESOLUTION_UNIT_CENTIMETER};

// =============================================================================
// Standard property names
// =============================================================================

/// Vendor that produced the slide.
pub const PROPERTY_VENDOR: &str = "openslide.vendor";

/// Free-form comment; removed by readers that store XML there.
pub const PROPERTY_COMMENT: &str = "openslide.comment";

/// Objective power (magnification) as an integer string.
pub const PROPERTY_OBJECTIVE_POWER: &str = "openslide.objective-power";

/// Microns per pixel in X at level 0.
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";

/// Microns per pixel in Y at level 0.
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";

/// The quickhash identifier.
pub const PROPERTY_QUICKHASH: &str = "openslide.quickhash-1";

/// Raw ImageDescription of the property directory.
pub const PROPERTY_TIFF_IMAGE_DESCRIPTION: &str = "tiff.ImageDescription";

// =============================================================================
// PropertyBag
// =============================================================================

/// String-keyed slide metadata, sorted for stable iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag {
    map: BTreeMap<String, String>,
}

impl PropertyBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        PropertyBag::default()
    }

    /// Set a property.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    /// Set a property when the value is present; absent values are
    /// simply not emitted.
    pub fn set_optional(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.map.insert(name.to_string(), value.to_string());
        }
    }

    /// Look up a property.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    /// Remove a property, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.remove(name)
    }

    /// Iterate properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy a property's leading integer into another property.
    ///
    /// Used to derive `openslide.objective-power` from a vendor field
    /// like `"40"` or `"40x"`. Does nothing when the source is absent or
    /// doesn't start with digits.
    pub fn duplicate_int_prop(&mut self, source: &str, destination: &str) {
        let Some(value) = self.map.get(source) else {
            return;
        };
        let digits: String = value
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(parsed) = digits.parse::<i64>() {
            self.map.insert(destination.to_string(), parsed.to_string());
        }
    }
}

// =============================================================================
// Property and hash seeding
// =============================================================================

/// Seed the generic TIFF-backed properties and compute the quickhash.
///
/// The property directory supplies the comment/description properties;
/// the quickhash directory's tile data, hashed in tile order, becomes
/// `openslide.quickhash-1`.
pub(crate) async fn init_properties_and_hash(
    props: &mut PropertyBag,
    tiff: &TiffFile,
    quickhash_dir: usize,
    property_dir: usize,
) -> Result<(), ScnError> {
    if let Some(description) = tiff.read_description(property_dir).await? {
        props.set(PROPERTY_COMMENT, description.clone());
        props.set(PROPERTY_TIFF_IMAGE_DESCRIPTION, description);
    }

    let digest = hash_directory_tiles(tiff, quickhash_dir).await?;
    debug!(quickhash_dir, %digest, "computed quickhash");
    props.set(PROPERTY_QUICKHASH, digest);

    Ok(())
}

/// SHA-256 over a directory's raw tile data, in row-major tile order.
async fn hash_directory_tiles(
    tiff: &TiffFile,
    dir: usize,
) -> Result<String, ScnError> {
    let directory = TiffDirectory::open(tiff.info(), dir)
        .map_err(|_| ScnError::bad_data("Couldn't locate TIFF directory for quickhash"))?;

    let mut hasher = Sha256::new();
    for row in 0..directory.geometry.tiles_down as i64 {
        for col in 0..directory.geometry.tiles_across as i64 {
            let data = tiff.read_raw_tile(&directory, col, row).await?;
            hasher.update(&data);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Set an MPP property from a resolution tag value.
///
/// Resolutions are pixels per centimeter; microns per pixel is
/// `10000 / resolution`. Nothing is emitted unless the unit is
/// centimeters and the resolution is a positive number.
pub(crate) fn set_resolution_prop(
    props: &mut PropertyBag,
    name: &str,
    resolution: Option<f64>,
    unit: Option<u16>,
) {
    if unit != Some(RESOLUTION_UNIT_CENTIMETER) {
        return;
    }
    if let Some(res) = resolution {
        if res > 0.0 {
            props.set(name, format!("{}", 10000.0 / res));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
