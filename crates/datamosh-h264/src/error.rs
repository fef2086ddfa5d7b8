//! Error types for datamosh-h264.

use std::io;
use thiserror::Error;

/// Result type for datamosh-h264 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bitstream, NAL and mutation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Read, seek or write failure on the underlying source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte source ran dry in the middle of a field.
    #[error("Unexpected end of input")]
    EndOfInput,

    /// Byte-level read attempted while the bit cursor sits inside a byte.
    #[error("Byte read attempted at bit offset {bit_offset}")]
    Alignment { bit_offset: u8 },

    /// Exp-Golomb code with a runaway leading-zero prefix.
    #[error("Invalid Exp-Golomb code: {leading_zeros} leading zero bits")]
    InvalidCode { leading_zeros: u32 },

    /// Unsigned field wider than 32 bits requested.
    #[error("Invalid field width: {0} bits (max 32)")]
    InvalidWidth(u32),

    /// Bitstream violates the format's own rules.
    #[error("Format error: {0}")]
    Format(String),

    /// Decoded NAL type disagrees with the type recorded at location time.
    #[error("NAL type mismatch at offset {offset}: located {located}, decoded {decoded}")]
    Consistency {
        offset: u64,
        located: u8,
        decoded: u8,
    },

    /// A length-prefixed record declares more bytes than its sample holds.
    #[error(
        "Truncated NAL record in sample {sample} at offset {offset}: declared {declared} bytes, {available} available"
    )]
    TruncatedRecord {
        sample: u32,
        offset: u64,
        declared: u32,
        available: u32,
    },

    /// Slice parsing requested on a non-slice unit.
    #[error("Not a slice NAL unit (type {0})")]
    NotASlice(u8),

    /// NAL unit has no payload beyond its header byte.
    #[error("NAL unit at offset {0} has an empty payload")]
    EmptyPayload(u64),

    /// Write target cannot be positioned for random-access writes.
    #[error("Write target does not support random access: {0}")]
    UnsupportedTarget(io::Error),

    /// NAL byte range extends past the end of the target.
    #[error("NAL range {offset}+{length} exceeds target size {size}")]
    OutOfBounds { offset: u64, length: u32, size: u64 },

    /// NAL length field width outside 1..=4 bytes.
    #[error("Invalid NAL length field width: {0}")]
    InvalidLengthSize(u8),
}

impl Error {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Map an I/O error from a read, folding short reads into `EndOfInput`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::EndOfInput
        } else {
            Self::Io(err)
        }
    }
}
