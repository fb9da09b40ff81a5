//! Byte ranges and line descriptors

use serde::Serialize;
use std::fmt;

/// A byte range of the logical stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileRange {
    /// Logical offset of the first byte
    pub offset: u64,
    /// Number of bytes
    pub size: u64,
}

impl FileRange {
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Offset just past the last byte
    pub const fn next_offset(&self) -> u64 {
        self.offset + self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether `offset` falls inside the range
    pub const fn contains(&self, offset: u64) -> bool {
        self.offset <= offset && offset < self.next_offset()
    }
}

impl fmt::Display for FileRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.next_offset())
    }
}

/// A framed line returned by [`LineBuffer::load_next_line`](crate::LineBuffer::load_next_line)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    /// Bytes of the line, including its delimiter when one was found
    pub range: FileRange,
    /// The line ends at the end of the data without a delimiter
    pub partial: bool,
    /// The bytes are valid UTF-8
    pub valid_utf: bool,
}

impl Default for LineInfo {
    fn default() -> Self {
        Self {
            range: FileRange::default(),
            partial: false,
            valid_utf: true,
        }
    }
}

impl LineInfo {
    /// Empty, non-partial result: nothing more to read at this offset
    pub const fn is_eof(&self) -> bool {
        self.range.size == 0 && !self.partial
    }
}
