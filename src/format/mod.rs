//! Format parsers for whole slide images.
//!
//! The TIFF layer handles the container; `scn` implements the one
//! vendor format this crate reads; `jpeg` prepares tile streams for
//! decoding.

pub mod jpeg;
pub mod scn;
pub mod tiff;
