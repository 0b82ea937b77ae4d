//! Leica SCN format support.
//!
//! A Leica slide is a BigTIFF whose first directory's ImageDescription
//! is an XML manifest describing one collection of acquired images,
//! each a pyramid of TIFF directories placed on a common canvas. The
//! submodules split the work the way the data flows:
//!
//! - [`manifest`]: XML → [`Collection`] tree (ephemeral)
//! - [`levels`]: collection + TIFF structure → [`Level`]/[`Area`] stack
//! - [`reader`]: the [`ScnReader`] tying it together with the handle
//!   pool, tile cache, properties, and painting

mod levels;
mod manifest;
mod reader;

pub use levels::{Area, Level, MacroImage};
pub use manifest::{
    contains_leica_namespace, parse_manifest, Collection, Dimension, Image, BRIGHTFIELD,
    LEICA_XMLNS,
};
pub use reader::ScnReader;
