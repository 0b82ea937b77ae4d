use thiserror::Error;

/// I/O errors from the local-file range reader.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Could not open the slide file
    #[error("Couldn't open {path}: {message}")]
    Open { path: String, message: String },

    /// Read failed at the OS level
    #[error("Read failed at offset {offset}: {message}")]
    Read { offset: u64, message: String },

    /// Requested range exceeds file bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors that can occur when parsing TIFF structure.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// IFD bytes shorter than the declared entry count requires
    #[error("Truncated IFD: need {needed} bytes, got {got}")]
    TruncatedIfd { needed: usize, got: usize },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// The public error type of the reader.
///
/// Every failure in opening or painting a slide is one of three kinds:
/// the file is not a Leica slide at all (`FormatNotSupported`), the file
/// is recognizably Leica but violates an invariant (`BadData`), or the
/// underlying storage failed (`Io`). Messages carry context and never
/// embed raw XML.
#[derive(Debug, Clone, Error)]
pub enum ScnError {
    /// The file is not a Leica slide (wrong namespace, untiled TIFF, ...)
    #[error("Unsupported format: {reason}")]
    FormatNotSupported { reason: String },

    /// A recognizably Leica file whose contents violate an invariant
    #[error("{message}")]
    BadData { message: String },

    /// Error from the underlying file reader
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl ScnError {
    /// Shorthand for a `FormatNotSupported` error.
    pub fn not_supported(reason: impl Into<String>) -> Self {
        ScnError::FormatNotSupported {
            reason: reason.into(),
        }
    }

    /// Shorthand for a `BadData` error.
    pub fn bad_data(message: impl Into<String>) -> Self {
        ScnError::BadData {
            message: message.into(),
        }
    }
}

impl From<TiffError> for ScnError {
    fn from(err: TiffError) -> Self {
        match err {
            TiffError::Io(io) => ScnError::Io(io),
            // Not even a TIFF container
            err @ (TiffError::InvalidMagic(_)
            | TiffError::InvalidVersion(_)
            | TiffError::FileTooSmall { .. }) => ScnError::FormatNotSupported {
                reason: err.to_string(),
            },
            // A TIFF whose structure is broken
            other => ScnError::BadData {
                message: other.to_string(),
            },
        }
    }
}
