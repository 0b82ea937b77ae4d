//! Raw IFD (Image File Directory) parsing.
//!
//! An IFD is a counted list of fixed-size entries followed by the offset
//! of the next IFD. Each entry names a tag, a field type, an element
//! count, and either the value itself (when it fits) or the file offset
//! where the value lives. This module keeps entries in raw form; typed
//! access goes through [`super::values::ValueReader`].

use crate::error::TiffError;

use super::parser::{ByteOrder, TiffHeader};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// IfdEntry
// =============================================================================

/// One raw IFD entry.
///
/// The value/offset field is kept as raw bytes because its meaning
/// depends on the field type, the count, and the container format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag_id: u16,

    /// Decoded field type, `None` when the type code is unknown
    pub field_type: Option<FieldType>,

    /// The raw field type code as stored in the file
    pub field_type_raw: u16,

    /// Number of elements of the field type
    pub count: u64,

    /// Raw bytes of the value/offset field (4 bytes classic, 8 BigTIFF)
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value is stored inline in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total byte size of this entry's value, `None` for unknown types.
    pub fn value_byte_size(&self) -> Option<u64> {
        let field_type = self.field_type?;
        Some(field_type.size_in_bytes() as u64 * self.count)
    }

    /// The file offset of an out-of-line value.
    ///
    /// Meaningless for inline entries; callers check `is_inline` first.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() == 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Read a single inline integer value (Short or Long).
    ///
    /// Returns `None` when the value is out of line, the count is not 1,
    /// or the field type doesn't hold a u32-sized integer.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Read a single inline integer value (Short, Long, or Long8).
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed IFD: its raw entries plus the offset of the next IFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// Entries in file order
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD in the chain, 0 when this is the last
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// An IFD with no entries, for tests and placeholders.
    pub fn empty() -> Self {
        Ifd {
            entries: Vec::new(),
            next_ifd_offset: 0,
        }
    }

    /// Total byte size of an IFD with `entry_count` entries.
    ///
    /// Covers the count field, the entries, and the next-IFD offset.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Parse an IFD from raw bytes.
    ///
    /// `bytes` must start at the IFD's count field and contain the whole
    /// IFD including the trailing next-IFD offset.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::TruncatedIfd {
                needed: count_size,
                got: bytes.len(),
            });
        }

        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(bytes)
        } else {
            header.byte_order.read_u16(bytes) as u64
        };

        let total_size = Self::calculate_size(entry_count, header);
        if bytes.len() < total_size {
            return Err(TiffError::TruncatedIfd {
                needed: total_size,
                got: bytes.len(),
            });
        }

        let entry_size = header.ifd_entry_size();
        let value_size = header.value_offset_size();
        let byte_order = header.byte_order;

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut offset = count_size;

        for _ in 0..entry_count {
            let entry_bytes = &bytes[offset..offset + entry_size];

            let tag_id = byte_order.read_u16(&entry_bytes[0..2]);
            let field_type_raw = byte_order.read_u16(&entry_bytes[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);

            let (count, value_start) = if header.is_bigtiff {
                (byte_order.read_u64(&entry_bytes[4..12]), 12)
            } else {
                (byte_order.read_u32(&entry_bytes[4..8]) as u64, 8)
            };

            let value_offset_bytes = entry_bytes[value_start..value_start + value_size].to_vec();

            let is_inline = field_type
                .map(|ft| ft.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries.push(IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes,
                is_inline,
            });

            offset += entry_size;
        }

        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[offset..])
        } else {
            byte_order.read_u32(&bytes[offset..]) as u64
        };

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    /// Find an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        let id = tag.as_u16();
        self.entries.iter().find(|e| e.tag_id == id)
    }

    /// Read a tag's single inline integer value (Short or Long).
    pub fn u32_value(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    /// Read a tag's single inline integer value as u16.
    pub fn u16_value(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u16> {
        let value = self.u32_value(tag, byte_order)?;
        u16::try_from(value).ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
