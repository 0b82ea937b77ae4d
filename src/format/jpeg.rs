//! JPEG stream preparation for tile decoding.
//!
//! Scanner TIFFs often store tiles as "abbreviated" JPEG streams: the
//! entropy-coded data without the quantization (DQT) and Huffman (DHT)
//! tables, which live once per directory in the `JPEGTables` tag. Such a
//! tile must be recombined with the shared tables before a standard JPEG
//! decoder will accept it:
//!
//! ```text
//! SOI + tables (EOI stripped) + tile (SOI stripped) ... EOI
//! ```

use bytes::{Bytes, BytesMut};

/// Start Of Image marker
const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
const SOS: [u8; 2] = [0xFF, 0xDA];

/// Check if JPEG data is an abbreviated stream (missing tables).
///
/// Abbreviated means: starts with SOI and reaches SOS without passing a
/// DQT or DHT marker.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];

        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the marker segment: marker + 2-byte length + payload.
        // Standalone markers (fill bytes, SOI, EOI) have no length field.
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Check if JPEG data is a complete stream (carries its own tables).
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }
    data.windows(2).skip(2).any(|w| w == DQT)
}

/// Merge shared JPEG tables with an abbreviated tile stream.
///
/// Strips the trailing EOI from the tables and the leading SOI from the
/// tile, then concatenates, yielding one well-formed stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.len() >= 2 && tables[tables.len() - 2..] == EOI {
        tables.len() - 2
    } else {
        tables.len()
    };

    let tile_start = if tile_data.len() >= 2 && tile_data[0..2] == SOI {
        2
    } else {
        0
    };

    let mut result = BytesMut::with_capacity(tables_end + (tile_data.len() - tile_start));
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Prepare raw tile bytes for decoding.
///
/// Complete streams pass through untouched; abbreviated streams get the
/// directory's tables merged in.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    if is_complete_stream(tile_data) {
        return Bytes::copy_from_slice(tile_data);
    }

    if let Some(tables) = tables {
        if is_abbreviated_stream(tile_data) {
            return merge_jpeg_tables(tables, tile_data);
        }
    }

    Bytes::copy_from_slice(tile_data)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI + DQT(minimal) + EOI
    fn tables_stream() -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0x00, 0x01]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    /// SOI + SOS(minimal) + scan bytes + EOI
    fn abbreviated_tile() -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        data.extend_from_slice(&[0x12, 0x34, 0x56]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    #[test]
    fn test_detects_abbreviated_stream() {
        assert!(is_abbreviated_stream(&abbreviated_tile()));
        assert!(!is_abbreviated_stream(&tables_stream()));
        assert!(!is_abbreviated_stream(&[0x00, 0x01, 0x02, 0x03]));
        assert!(!is_abbreviated_stream(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_detects_complete_stream() {
        assert!(is_complete_stream(&tables_stream()));
        assert!(!is_complete_stream(&abbreviated_tile()));
        assert!(!is_complete_stream(b""));
    }

    #[test]
    fn test_merge_structure() {
        let merged = merge_jpeg_tables(&tables_stream(), &abbreviated_tile());

        // One SOI at the start, one EOI at the end
        assert_eq!(&merged[0..2], &SOI);
        assert_eq!(&merged[merged.len() - 2..], &EOI);

        // Tables DQT present before the scan
        let dqt_pos = merged.windows(2).position(|w| w == DQT).unwrap();
        let sos_pos = merged.windows(2).position(|w| w == SOS).unwrap();
        assert!(dqt_pos < sos_pos);

        // No second SOI
        let soi_count = merged.windows(2).filter(|w| *w == SOI).count();
        assert_eq!(soi_count, 1);
    }

    #[test]
    fn test_merge_edge_cases() {
        assert_eq!(
            merge_jpeg_tables(&[], &abbreviated_tile())[..],
            abbreviated_tile()[..]
        );
        assert!(merge_jpeg_tables(&tables_stream(), &[]).is_empty());
    }

    #[test]
    fn test_prepare_passes_complete_through() {
        let complete = tables_stream();
        let prepared = prepare_tile_jpeg(Some(&tables_stream()), &complete);
        assert_eq!(&prepared[..], &complete[..]);
    }

    #[test]
    fn test_prepare_merges_abbreviated() {
        let prepared = prepare_tile_jpeg(Some(&tables_stream()), &abbreviated_tile());
        assert!(is_complete_stream(&prepared));
    }

    #[test]
    fn test_prepare_without_tables() {
        let tile = abbreviated_tile();
        let prepared = prepare_tile_jpeg(None, &tile);
        assert_eq!(&prepared[..], &tile[..]);
    }
}
