//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry (small values) or at
//! an offset in the file (arrays, strings). Array values such as
//! TileOffsets and TileByteCounts are fetched in one range request each;
//! with the block cache underneath that keeps structure parsing cheap.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::ifd::IfdEntry;
use super::parser::TiffHeader;
use super::tags::FieldType;

/// Reads tag values from a TIFF file.
///
/// Combines a RangeReader with header information so values are read
/// respecting the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Read the raw bytes of an entry's value.
    ///
    /// Inline values come from the entry itself, out-of-line values are
    /// fetched from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read an array of u64 values from an entry.
    ///
    /// This is how TileOffsets and TileByteCounts are loaded. Short, Long
    /// and Long8 are all widened to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;

        let mut values = Vec::with_capacity(count);

        match field_type {
            FieldType::Short => {
                for i in 0..count {
                    values.push(byte_order.read_u16(&bytes[i * 2..]) as u64);
                }
            }
            FieldType::Long => {
                for i in 0..count {
                    values.push(byte_order.read_u32(&bytes[i * 4..]) as u64);
                }
            }
            FieldType::Long8 => {
                for i in 0..count {
                    values.push(byte_order.read_u64(&bytes[i * 8..]));
                }
            }
            _ => {
                return Err(TiffError::InvalidTagValue {
                    tag: "array",
                    message: format!(
                        "expected Short, Long, or Long8 for array, got {:?}",
                        field_type
                    ),
                });
            }
        }

        Ok(values)
    }

    /// Read a string value from an entry (ASCII type).
    ///
    /// The string is nominally null-terminated; the terminator and
    /// anything after it are dropped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;

        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read a single RATIONAL value as f64.
    ///
    /// Used for XResolution/YResolution. A zero denominator yields `None`
    /// rather than an error; resolution metadata is best-effort.
    pub async fn read_rational(&self, entry: &IfdEntry) -> Result<Option<f64>, TiffError> {
        if entry.field_type != Some(FieldType::Rational) || entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: format!(
                    "expected a single Rational, got {:?} x{}",
                    entry.field_type, entry.count
                ),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        let numerator = byte_order.read_u32(&bytes[0..4]);
        let denominator = byte_order.read_u32(&bytes[4..8]);

        if denominator == 0 {
            return Ok(None);
        }
        Ok(Some(numerator as f64 / denominator as f64))
    }
}

// =============================================================================
// Tests
// =============================================================================
