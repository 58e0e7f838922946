use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete metadata.
    Format,
    /// A metadata block is full, or an index/transfer leaves a data block.
    Capacity,
    /// A requested keyword or HDU does not exist.
    NotFound,
    /// The call is not valid for this container.
    Usage,
    /// The underlying storage failed.
    Io,
}

/// All errors that can occur during FITS I/O operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed keyword name in a header card.
    #[error("invalid keyword name: {0:?}")]
    InvalidKeyword(String),
    /// A header value could not be converted to the requested type.
    #[error("invalid value for keyword {keyword}: {value:?}")]
    InvalidValue { keyword: String, value: String },
    /// A required keyword was not found in the header.
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),
    /// Unrecognized BITPIX value.
    #[error("invalid BITPIX value: {0}")]
    InvalidBitpix(i64),
    /// An axis length is zero or otherwise unusable.
    #[error("invalid length {size} for axis {axis}")]
    InvalidAxis { axis: usize, size: u64 },
    /// Storage ended before the END card was found.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A typed accessor was requested for a different element kind.
    #[error("element type mismatch: HDU holds BITPIX {found}, accessor expects BITPIX {expected}")]
    KindMismatch { expected: i64, found: i64 },

    /// No room left for another card in the reserved header blocks.
    #[error("insufficient metadata capacity: {capacity} cards reserved")]
    HeaderFull { capacity: usize },
    /// More indices were supplied than the HDU has axes.
    #[error("index has {given} components but the HDU has {naxis} axes")]
    TooManyIndices { given: usize, naxis: usize },
    /// An index component lies outside its axis.
    #[error("index {index} out of range for axis {axis} of length {size}")]
    IndexOutOfRange { axis: usize, index: u64, size: u64 },
    /// A transfer would run past the end of the HDU's array.
    #[error("transfer of {len} bytes at offset {offset} exceeds data extent of {extent} bytes")]
    OutOfBounds { offset: u64, len: u64, extent: u64 },
    /// A region's end cannot be represented as a 64-bit offset.
    #[error("region of {len} bytes at offset {offset} overflows the address space")]
    AddressOverflow { offset: u64, len: u64 },
    /// The byte length of a typed transfer cannot be represented.
    #[error("transfer of {count} elements of {width} bytes overflows the address space")]
    TransferTooLarge { count: usize, width: usize },

    /// A header keyword lookup found nothing.
    #[error("header keyword not found: {0}")]
    KeywordNotFound(String),
    /// An HDU index lies past the end of the file's directory.
    #[error("HDU {index} not found (file has {count})")]
    HduNotFound { index: usize, count: usize },

    /// A write was submitted through a read-only container.
    #[error("container is read-only")]
    ReadOnly,
    /// The writer refused to replace an existing file.
    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The array read from an HDU does not fit the requested shape.
    #[cfg(feature = "array")]
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidKeyword(_)
            | Error::InvalidValue { .. }
            | Error::MissingKeyword(_)
            | Error::InvalidBitpix(_)
            | Error::InvalidAxis { .. }
            | Error::UnexpectedEof
            | Error::KindMismatch { .. } => ErrorKind::Format,
            Error::HeaderFull { .. }
            | Error::TooManyIndices { .. }
            | Error::IndexOutOfRange { .. }
            | Error::OutOfBounds { .. }
            | Error::AddressOverflow { .. }
            | Error::TransferTooLarge { .. } => ErrorKind::Capacity,
            Error::KeywordNotFound(_) | Error::HduNotFound { .. } => ErrorKind::NotFound,
            Error::ReadOnly | Error::AlreadyExists(_) => ErrorKind::Usage,
            #[cfg(feature = "array")]
            Error::Shape(_) => ErrorKind::Format,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}
