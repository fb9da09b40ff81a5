//! Reference-counted views into cached bytes
//!
//! A [`BufferView`] keeps the cache segment it points into alive. The cache
//! never writes into a segment while a view holds it; instead it continues in
//! a fresh allocation and the view keeps the bytes it was handed.

use bytes::Bytes;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::range::FileRange;

/// Read-only window over a range of cached bytes
#[derive(Clone)]
pub struct BufferView {
    segment: Arc<Vec<u8>>,
    start: usize,
    len: usize,
    offset: u64,
    generation: u64,
}

impl BufferView {
    pub(crate) fn new(
        segment: Arc<Vec<u8>>,
        start: usize,
        len: usize,
        offset: u64,
        generation: u64,
    ) -> Self {
        debug_assert!(start + len <= segment.len());
        Self {
            segment,
            start,
            len,
            offset,
            generation,
        }
    }

    /// The viewed bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.segment[self.start..self.start + self.len]
    }

    /// Logical offset of the first byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical range covered by the view
    pub fn range(&self) -> FileRange {
        FileRange::new(self.offset, self.len as u64)
    }

    /// Cache segment generation the view was taken from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The bytes as UTF-8, if valid
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_slice()).ok()
    }

    /// Convert into [`Bytes`] sharing the same allocation
    pub fn into_bytes(self) -> Bytes {
        Bytes::from_owner(self)
    }
}

impl Deref for BufferView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for BufferView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq<[u8]> for BufferView {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl fmt::Debug for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
