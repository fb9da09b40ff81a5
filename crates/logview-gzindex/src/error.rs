//! Error types for indexed decompression

use thiserror::Error;

/// Result type for index operations
pub type GzIndexResult<T> = std::result::Result<T, GzIndexError>;

/// Errors raised while parsing containers or inflating compressed data
#[derive(Debug, Error)]
pub enum GzIndexError {
    /// I/O error from the underlying source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container header is truncated or malformed
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Container uses a feature this reader does not handle
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Reader configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The deflate stream could not be decoded
    #[error("corrupt compressed stream at compressed offset {offset}: {reason}")]
    CorruptStream {
        /// Compressed offset where decoding stopped
        offset: u64,
        /// Decoder status or description
        reason: String,
    },

    /// Gzip trailer CRC-32 does not match the decompressed member
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// CRC-32 stored in the trailer
        expected: u32,
        /// CRC-32 of the inflated data
        actual: u32,
    },

    /// Gzip trailer ISIZE does not match the decompressed member
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// ISIZE stored in the trailer (modulo 2^32)
        expected: u32,
        /// Inflated length modulo 2^32
        actual: u32,
    },
}

impl GzIndexError {
    /// Whether the error came from the source rather than the data
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptStream {
            offset,
            reason: reason.into(),
        }
    }
}
