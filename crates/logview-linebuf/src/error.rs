//! Error types for the line buffer

use logview_gzindex::GzIndexError;
use thiserror::Error;

/// Result type for line buffer operations
pub type LineBufferResult<T> = std::result::Result<T, LineBufferError>;

/// Errors returned by [`LineBuffer`](crate::LineBuffer) operations
#[derive(Debug, Error)]
pub enum LineBufferError {
    /// Read or metadata call on the attached descriptor failed
    #[error("source error: {0}")]
    Source(#[from] std::io::Error),

    /// Compressed data could not be decoded
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(#[source] GzIndexError),

    /// A single line does not fit in the largest permitted buffer
    #[error("line at offset {offset} exceeds the {limit} byte buffer limit")]
    LineTooLong {
        /// Logical offset where the line starts
        offset: u64,
        /// Largest buffer that was tried
        limit: usize,
    },

    /// Requested bytes lie outside the data the source can provide
    #[error("range {offset}+{size} is outside the available data (end at {available})")]
    InvalidRange {
        /// Requested start offset
        offset: u64,
        /// Requested length
        size: u64,
        /// End of the data known to be readable
        available: u64,
    },

    /// Operation requires an attached source
    #[error("no source attached")]
    NotAttached,

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<GzIndexError> for LineBufferError {
    fn from(error: GzIndexError) -> Self {
        match error {
            GzIndexError::Io(io) => Self::Source(io),
            other => Self::CorruptStream(other),
        }
    }
}

impl LineBufferError {
    /// Platform error code for source failures
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Source(io) => io.raw_os_error(),
            _ => None,
        }
    }

    /// Whether the error is a resource bound rather than a failure of the source
    pub fn is_line_too_long(&self) -> bool {
        matches!(self, Self::LineTooLong { .. })
    }
}
