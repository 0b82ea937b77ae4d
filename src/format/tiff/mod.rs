//! TIFF layer for Leica slides.
//!
//! Leica slides are BigTIFF containers; this module owns everything
//! between raw bytes and "give me tile (col, row) of directory N":
//!
//! - **Byte order**: files declare their endianness (II = little-endian,
//!   MM = big-endian) in the header; every multi-byte value respects it.
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets, handled
//!   transparently.
//! - **IFD (Image File Directory)**: one per raster. The Leica manifest
//!   addresses rasters by directory index, so there is no pyramid
//!   guessing here, just a faithful walk of the chain.
//! - **Handle pool**: a bounded set of file handles; each painter call
//!   leases one for its whole run.

mod directory;
mod ifd;
mod parser;
mod pool;
mod tags;
mod values;

pub use directory::{IfdInfo, Resolution, TiffDirectory, TiffInfo, TileGeometry};
pub use ifd::{Ifd, IfdEntry};
pub use parser::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pool::{TiffFile, TiffHandle, TiffPool};
pub use tags::{Compression, FieldType, TiffTag, RESOLUTION_UNIT_CENTIMETER};
pub use values::ValueReader;
