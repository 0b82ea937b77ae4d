//! Leica SCN manifest parsing.
//!
//! A Leica slide stores an XML manifest in the first directory's
//! ImageDescription. The recognizable shape is:
//!
//! ```text
//! scn (default namespace http://www.leica-microsystems.com/scn/2010/10/01)
//!   collection @sizeX @sizeY
//!     barcode
//!     image
//!       view @sizeX @sizeY @offsetX @offsetY
//!       device @model @version
//!       creationDate
//!       scanSettings
//!         illuminationSettings
//!           illuminationSource
//!           numericalAperture
//!         objectiveSettings
//!           objective
//!       pixels
//!         dimension @ifd @sizeX @sizeY [@z]
//! ```
//!
//! Geometry is declared in "clicks", the scanner's sub-pixel stage unit.
//! Each dimension (one TIFF directory) converts clicks to its own pixel
//! grid through `clicks_per_pixel = image clicks across / pixel width`.
//!
//! The parsed tree is ephemeral: it exists only while a slide is opened
//! and is discarded once the level stack is built.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::ScnError;

/// The Leica SCN XML namespace; anything else is not a Leica slide.
pub const LEICA_XMLNS: &str = "http://www.leica-microsystems.com/scn/2010/10/01";

/// Illumination source value accepted for composited images.
pub const BRIGHTFIELD: &str = "brightfield";

/// Cheap pre-parse gate: does the description mention the namespace?
pub fn contains_leica_namespace(description: &str) -> bool {
    description.contains(LEICA_XMLNS)
}

// =============================================================================
// Parsed tree
// =============================================================================

/// The whole slide as declared by the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// Slide barcode, when printed into the manifest
    pub barcode: Option<String>,

    /// Canvas width in clicks
    pub clicks_across: i64,

    /// Canvas height in clicks
    pub clicks_down: i64,

    /// Acquired images in manifest order
    pub images: Vec<Image>,
}

/// One acquisition (main or macro) and its placement on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Acquisition timestamp text
    pub creation_date: Option<String>,

    /// Scanner model
    pub device_model: Option<String>,

    /// Scanner firmware/software version
    pub device_version: Option<String>,

    /// Illumination source; only `"brightfield"` images are composited
    pub illumination_source: Option<String>,

    /// Objective magnification, kept as text
    pub objective: Option<String>,

    /// Numerical aperture, kept as text
    pub aperture: Option<String>,

    /// Image width in clicks
    pub clicks_across: i64,

    /// Image height in clicks
    pub clicks_down: i64,

    /// Placement offset in clicks
    pub clicks_offset_x: i64,

    /// Placement offset in clicks
    pub clicks_offset_y: i64,

    /// Whether this image is the whole-slide macro overview
    pub is_macro: bool,

    /// Pyramid rasters, sorted by descending width (ties in input order)
    pub dimensions: Vec<Dimension>,
}

impl Image {
    /// Whether this image was acquired under brightfield illumination.
    pub fn is_brightfield(&self) -> bool {
        self.illumination_source.as_deref() == Some(BRIGHTFIELD)
    }
}

/// One pyramid raster of one image, backed by exactly one TIFF directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    /// TIFF directory index
    pub dir: i64,

    /// Raster width in pixels
    pub width: i64,

    /// Raster height in pixels
    pub height: i64,

    /// Clicks per pixel of this raster
    pub clicks_per_pixel: f64,
}

// =============================================================================
// Parser
// =============================================================================

/// Parse the manifest XML into a [`Collection`].
///
/// Fails with `FormatNotSupported` when the XML is not Leica (missing or
/// wrong namespace, unparseable document) and `BadData` when the
/// document is Leica but structurally invalid. Nothing partial is ever
/// returned.
pub fn parse_manifest(xml: &str) -> Result<Collection, ScnError> {
    if !contains_leica_namespace(xml) {
        return Err(ScnError::not_supported("Not a Leica slide"));
    }

    let mut reader = NsReader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(true);
    config.expand_empty_elements = true;

    let mut state = ParserState::default();

    loop {
        match reader.read_resolved_event() {
            Ok((resolution, Event::Start(e))) => {
                let in_ns = is_leica(&resolution);
                state.start_element(&e, in_ns)?;
            }
            Ok((_, Event::Text(e))) => {
                let text = e
                    .unescape()
                    .map_err(|e| ScnError::not_supported(e.to_string()))?;
                state.text(&text);
            }
            Ok((_, Event::End(_))) => {
                state.end_element()?;
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => return Err(ScnError::not_supported(e.to_string())),
        }
    }

    state.finish()
}

fn is_leica(resolution: &ResolveResult) -> bool {
    matches!(resolution, ResolveResult::Bound(Namespace(ns)) if *ns == LEICA_XMLNS.as_bytes())
}

/// Read a required integer attribute.
fn int_attr(e: &BytesStart, name: &str, element: &str) -> Result<i64, ScnError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| ScnError::not_supported(err.to_string()))?
        .ok_or_else(|| {
            ScnError::bad_data(format!("Missing attribute {} on <{}>", name, element))
        })?;
    let value = attr
        .unescape_value()
        .map_err(|err| ScnError::not_supported(err.to_string()))?;
    value.trim().parse::<i64>().map_err(|_| {
        ScnError::bad_data(format!(
            "Invalid integer attribute {} on <{}>: '{}'",
            name, element, value
        ))
    })
}

/// Read an optional string attribute.
fn string_attr(e: &BytesStart, name: &str) -> Result<Option<String>, ScnError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| ScnError::not_supported(err.to_string()))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|err| ScnError::not_supported(err.to_string()))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

#[derive(Default)]
struct CollectionBuilder {
    barcode: Option<String>,
    clicks_across: i64,
    clicks_down: i64,
    images: Vec<Image>,
}

#[derive(Default)]
struct ImageBuilder {
    creation_date: Option<String>,
    device_model: Option<String>,
    device_version: Option<String>,
    illumination_source: Option<String>,
    objective: Option<String>,
    aperture: Option<String>,
    view: Option<(i64, i64, i64, i64)>,
    dimensions: Vec<(i64, i64, i64)>,
}

#[derive(Default)]
struct ParserState {
    /// Open elements: (local name, was in the Leica namespace)
    path: Vec<(String, bool)>,
    root_checked: bool,
    collection: Option<CollectionBuilder>,
    image: Option<ImageBuilder>,
}

impl ParserState {
    /// Whether the current open-element path is exactly `names`, with
    /// every element in the Leica namespace.
    fn at(&self, names: &[&str]) -> bool {
        self.path.len() == names.len()
            && self
                .path
                .iter()
                .zip(names)
                .all(|((name, in_ns), expected)| *in_ns && name == expected)
    }

    fn start_element(&mut self, e: &BytesStart, in_ns: bool) -> Result<(), ScnError> {
        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        if !self.root_checked {
            self.root_checked = true;
            if !in_ns {
                return Err(ScnError::not_supported("Unexpected XML namespace"));
            }
        }

        if in_ns {
            if self.at(&["scn"]) && local == "collection" {
                self.collection = Some(CollectionBuilder {
                    clicks_across: int_attr(e, "sizeX", "collection")?,
                    clicks_down: int_attr(e, "sizeY", "collection")?,
                    ..CollectionBuilder::default()
                });
            } else if self.at(&["scn", "collection"]) && local == "image" {
                self.image = Some(ImageBuilder::default());
            } else if self.at(&["scn", "collection", "image"]) && local == "view" {
                if let Some(image) = self.image.as_mut() {
                    image.view = Some((
                        int_attr(e, "sizeX", "view")?,
                        int_attr(e, "sizeY", "view")?,
                        int_attr(e, "offsetX", "view")?,
                        int_attr(e, "offsetY", "view")?,
                    ));
                }
            } else if self.at(&["scn", "collection", "image"]) && local == "device" {
                if let Some(image) = self.image.as_mut() {
                    image.device_model = string_attr(e, "model")?;
                    image.device_version = string_attr(e, "version")?;
                }
            } else if self.at(&["scn", "collection", "image", "pixels"]) && local == "dimension" {
                // Accept only dimensions from z-plane 0
                let z_plane = string_attr(e, "z")?;
                let keep = match z_plane.as_deref() {
                    Some(z) => z == "0",
                    None => true,
                };
                if keep {
                    if let Some(image) = self.image.as_mut() {
                        image.dimensions.push((
                            int_attr(e, "ifd", "dimension")?,
                            int_attr(e, "sizeX", "dimension")?,
                            int_attr(e, "sizeY", "dimension")?,
                        ));
                    }
                }
            }
        }

        self.path.push((local, in_ns));
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.at(&["scn", "collection", "barcode"]) {
            if let Some(collection) = self.collection.as_mut() {
                append(&mut collection.barcode, text);
            }
            return;
        }

        let is_creation_date = self.at(&["scn", "collection", "image", "creationDate"]);
        let is_illumination_source = self.at(&[
            "scn",
            "collection",
            "image",
            "scanSettings",
            "illuminationSettings",
            "illuminationSource",
        ]);
        let is_objective = self.at(&[
            "scn",
            "collection",
            "image",
            "scanSettings",
            "objectiveSettings",
            "objective",
        ]);
        let is_aperture = self.at(&[
            "scn",
            "collection",
            "image",
            "scanSettings",
            "illuminationSettings",
            "numericalAperture",
        ]);

        let Some(image) = self.image.as_mut() else {
            return;
        };
        if is_creation_date {
            append(&mut image.creation_date, text);
        } else if is_illumination_source {
            append(&mut image.illumination_source, text);
        } else if is_objective {
            append(&mut image.objective, text);
        } else if is_aperture {
            append(&mut image.aperture, text);
        }
    }

    fn end_element(&mut self) -> Result<(), ScnError> {
        let Some((local, in_ns)) = self.path.pop() else {
            return Ok(());
        };

        if in_ns && local == "image" && self.at(&["scn", "collection"]) {
            let builder = self
                .image
                .take()
                .ok_or_else(|| ScnError::bad_data("Unbalanced image element"))?;
            let collection = self
                .collection
                .as_mut()
                .ok_or_else(|| ScnError::bad_data("Image outside collection"))?;
            let image = finish_image(builder, collection)?;
            collection.images.push(image);
        }

        Ok(())
    }

    fn finish(self) -> Result<Collection, ScnError> {
        let collection = self
            .collection
            .ok_or_else(|| ScnError::bad_data("Can't find collection element"))?;

        if collection.images.is_empty() {
            return Err(ScnError::bad_data("Can't find any images"));
        }

        Ok(Collection {
            barcode: collection.barcode,
            clicks_across: collection.clicks_across,
            clicks_down: collection.clicks_down,
            images: collection.images,
        })
    }
}

fn append(slot: &mut Option<String>, text: &str) {
    slot.get_or_insert_with(String::new).push_str(text);
}

fn finish_image(builder: ImageBuilder, collection: &CollectionBuilder) -> Result<Image, ScnError> {
    let (clicks_across, clicks_down, clicks_offset_x, clicks_offset_y) = builder
        .view
        .ok_or_else(|| ScnError::bad_data("Can't find view node"))?;

    if builder.dimensions.is_empty() {
        return Err(ScnError::bad_data("Can't find any dimensions in image"));
    }

    let mut dimensions = Vec::with_capacity(builder.dimensions.len());
    for (dir, width, height) in builder.dimensions {
        if width <= 0 || height <= 0 {
            return Err(ScnError::bad_data(format!(
                "Invalid dimension size {}x{} for directory {}",
                width, height, dir
            )));
        }
        dimensions.push(Dimension {
            dir,
            width,
            height,
            clicks_per_pixel: clicks_across as f64 / width as f64,
        });
    }

    // Widest raster first; equal widths keep manifest order
    dimensions.sort_by(|a, b| b.width.cmp(&a.width));

    let is_macro = clicks_offset_x == 0
        && clicks_offset_y == 0
        && clicks_across == collection.clicks_across
        && clicks_down == collection.clicks_down;

    Ok(Image {
        creation_date: builder.creation_date,
        device_model: builder.device_model,
        device_version: builder.device_version,
        illumination_source: builder.illumination_source,
        objective: builder.objective,
        aperture: builder.aperture,
        clicks_across,
        clicks_down,
        clicks_offset_x,
        clicks_offset_y,
        is_macro,
        dimensions,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(collection_attrs: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<scn xmlns="{}">
  <collection {}>
    {}
  </collection>
</scn>"#,
            LEICA_XMLNS, collection_attrs, body
        )
    }

    fn main_image(offset_x: i64, offset_y: i64, dims: &str) -> String {
        format!(
            r#"<image>
      <creationDate>2021-03-12T10:15:00Z</creationDate>
      <device model="Leica SCN400" version="1.5.1"/>
      <view sizeX="100000" sizeY="80000" offsetX="{}" offsetY="{}"/>
      <scanSettings>
        <objectiveSettings><objective>40</objective></objectiveSettings>
        <illuminationSettings>
          <numericalAperture>0.75</numericalAperture>
          <illuminationSource>brightfield</illuminationSource>
        </illuminationSettings>
      </scanSettings>
      <pixels>{}</pixels>
    </image>"#,
            offset_x, offset_y, dims
        )
    }

    fn basic_manifest() -> String {
        wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &format!(
                "<barcode>AB-123</barcode>{}",
                main_image(
                    0,
                    0,
                    r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>
                       <dimension ifd="2" sizeX="500" sizeY="400"/>"#,
                )
            ),
        )
    }

    #[test]
    fn test_parse_basic_manifest() {
        let collection = parse_manifest(&basic_manifest()).unwrap();

        assert_eq!(collection.barcode.as_deref(), Some("AB-123"));
        assert_eq!(collection.clicks_across, 100000);
        assert_eq!(collection.clicks_down, 80000);
        assert_eq!(collection.images.len(), 1);

        let image = &collection.images[0];
        assert_eq!(image.creation_date.as_deref(), Some("2021-03-12T10:15:00Z"));
        assert_eq!(image.device_model.as_deref(), Some("Leica SCN400"));
        assert_eq!(image.device_version.as_deref(), Some("1.5.1"));
        assert_eq!(image.illumination_source.as_deref(), Some("brightfield"));
        assert!(image.is_brightfield());
        assert_eq!(image.objective.as_deref(), Some("40"));
        assert_eq!(image.aperture.as_deref(), Some("0.75"));
        assert!(image.is_macro);

        assert_eq!(image.dimensions.len(), 2);
        assert_eq!(image.dimensions[0].dir, 1);
        assert_eq!(image.dimensions[0].width, 1000);
        assert_eq!(image.dimensions[0].clicks_per_pixel, 100.0);
        assert_eq!(image.dimensions[1].dir, 2);
        assert_eq!(image.dimensions[1].clicks_per_pixel, 200.0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let xml = basic_manifest();
        let first = parse_manifest(&xml).unwrap();
        let second = parse_manifest(&xml).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_namespace_is_not_leica() {
        let xml = r#"<scn><collection sizeX="1" sizeY="1"/></scn>"#;
        let err = parse_manifest(xml).unwrap_err();
        assert!(matches!(err, ScnError::FormatNotSupported { .. }));
    }

    #[test]
    fn test_namespace_elsewhere_but_wrong_root() {
        // The gate substring is present, but the document's namespace is
        // something else entirely
        let xml = format!(
            r#"<scn xmlns="http://example.com/other"><note>{}</note></scn>"#,
            LEICA_XMLNS
        );
        let err = parse_manifest(&xml).unwrap_err();
        match err {
            ScnError::FormatNotSupported { reason } => {
                assert!(reason.contains("namespace"), "reason: {}", reason)
            }
            other => panic!("expected FormatNotSupported, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_collection() {
        let xml = format!(r#"<scn xmlns="{}"><other/></scn>"#, LEICA_XMLNS);
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("collection"));
    }

    #[test]
    fn test_missing_images() {
        let xml = wrap(r#"sizeX="100" sizeY="100""#, "");
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("images"));
    }

    #[test]
    fn test_barcode_is_optional() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        let collection = parse_manifest(&xml).unwrap();
        assert_eq!(collection.barcode, None);
    }

    #[test]
    fn test_missing_collection_size_attr() {
        let xml = wrap(
            r#"sizeX="100000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("sizeY"));
        assert!(err.to_string().contains("collection"));
    }

    #[test]
    fn test_non_integer_attribute() {
        let xml = wrap(
            r#"sizeX="wide" sizeY="80000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        let err = parse_manifest(&xml).unwrap_err();
        match err {
            ScnError::BadData { message } => assert!(message.contains("sizeX")),
            other => panic!("expected BadData, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_view() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            r#"<image><pixels><dimension ifd="1" sizeX="1000" sizeY="800"/></pixels></image>"#,
        );
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("view"));
    }

    #[test]
    fn test_image_without_dimensions() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            r#"<image><view sizeX="100000" sizeY="80000" offsetX="0" offsetY="0"/><pixels/></image>"#,
        );
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn test_z_plane_filter() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(
                0,
                0,
                r#"<dimension ifd="1" sizeX="1000" sizeY="800" z="0"/>
                   <dimension ifd="7" sizeX="1000" sizeY="800" z="1"/>
                   <dimension ifd="2" sizeX="500" sizeY="400"/>"#,
            ),
        );
        let collection = parse_manifest(&xml).unwrap();
        let dims = &collection.images[0].dimensions;

        // z="1" excluded; z="0" and unannotated retained
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].dir, 1);
        assert_eq!(dims[1].dir, 2);
    }

    #[test]
    fn test_all_dimensions_off_plane() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800" z="3"/>"#),
        );
        let err = parse_manifest(&xml).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn test_dimension_sort_descending_stable() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(
                0,
                0,
                r#"<dimension ifd="3" sizeX="500" sizeY="400"/>
                   <dimension ifd="1" sizeX="1000" sizeY="800"/>
                   <dimension ifd="9" sizeX="500" sizeY="400"/>"#,
            ),
        );
        let collection = parse_manifest(&xml).unwrap();
        let dirs: Vec<i64> = collection.images[0]
            .dimensions
            .iter()
            .map(|d| d.dir)
            .collect();

        // Descending width; the two 500-wide entries keep manifest order
        assert_eq!(dirs, vec![1, 3, 9]);
    }

    #[test]
    fn test_is_macro_requires_zero_offset_and_full_size() {
        // Matching size but nonzero offset
        let offset = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(10, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        assert!(!parse_manifest(&offset).unwrap().images[0].is_macro);

        // Zero offset but smaller than the canvas
        let small = wrap(
            r#"sizeX="200000" sizeY="80000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        assert!(!parse_manifest(&small).unwrap().images[0].is_macro);

        // Zero offset and full canvas size
        let full = wrap(
            r#"sizeX="100000" sizeY="80000""#,
            &main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="800"/>"#),
        );
        assert!(parse_manifest(&full).unwrap().images[0].is_macro);
    }

    #[test]
    fn test_multiple_images_preserve_order() {
        let xml = wrap(
            r#"sizeX="200000" sizeY="100000""#,
            &format!(
                "{}{}",
                main_image(0, 0, r#"<dimension ifd="1" sizeX="1000" sizeY="1000"/>"#),
                main_image(100000, 0, r#"<dimension ifd="3" sizeX="1000" sizeY="1000"/>"#),
            ),
        );
        let collection = parse_manifest(&xml).unwrap();

        assert_eq!(collection.images.len(), 2);
        assert_eq!(collection.images[0].clicks_offset_x, 0);
        assert_eq!(collection.images[1].clicks_offset_x, 100000);
        assert!(!collection.images[1].is_macro);
    }

    #[test]
    fn test_malformed_xml_is_not_supported() {
        let xml = format!(r#"<scn xmlns="{}"><collection"#, LEICA_XMLNS);
        let err = parse_manifest(&xml).unwrap_err();
        assert!(matches!(err, ScnError::FormatNotSupported { .. }));
    }

    #[test]
    fn test_clicks_per_pixel_uses_image_width() {
        let xml = wrap(
            r#"sizeX="100000" sizeY="100000""#,
            r#"<image>
      <view sizeX="50000" sizeY="50000" offsetX="25000" offsetY="25000"/>
      <scanSettings>
        <illuminationSettings><illuminationSource>brightfield</illuminationSource></illuminationSettings>
      </scanSettings>
      <pixels><dimension ifd="4" sizeX="500" sizeY="500"/></pixels>
    </image>"#,
        );
        let collection = parse_manifest(&xml).unwrap();
        let dim = &collection.images[0].dimensions[0];

        // 50000 image clicks / 500 pixels, not the collection's 100000
        assert_eq!(dim.clicks_per_pixel, 100.0);
    }
}
