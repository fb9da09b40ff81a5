//! Sliding, resizable byte cache over the logical stream
//!
//! The cache holds one contiguous window `[base_offset, base_offset + size)`
//! of the logical stream in a single segment of `capacity` bytes. Segments
//! are shared with [`BufferView`]s through an `Arc`; whenever the cache has
//! to write into a segment that a view still references, it copies the bytes
//! it keeps into a fresh segment first.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{LineBufferError, LineBufferResult};
use crate::range::FileRange;
use crate::view::BufferView;

/// Counters describing cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Committed reads into the cache
    pub fills: u64,
    /// Bytes added by those reads
    pub bytes_filled: u64,
    /// Times retained bytes were moved to the front of the segment
    pub relocations: u64,
    /// Times a larger segment was allocated
    pub reallocations: u64,
    /// Times a segment was copied because views still referenced it
    pub detached_copies: u64,
    /// Bytes copied by those detaches
    pub detached_bytes: u64,
}

/// Byte cache with a lazily allocated segment
pub struct ByteCache {
    segment: Arc<Vec<u8>>,
    base_offset: u64,
    size: usize,
    max_capacity: usize,
    growth_increment: usize,
    generation: u64,
    stats: CacheStats,
}

impl ByteCache {
    /// Create an empty cache; nothing is allocated until the first fill
    pub fn new(max_capacity: usize, growth_increment: usize) -> Self {
        Self {
            segment: Arc::new(Vec::new()),
            base_offset: 0,
            size: 0,
            max_capacity,
            growth_increment: growth_increment.max(1),
            generation: 0,
            stats: CacheStats::default(),
        }
    }

    /// Allocated bytes
    pub fn capacity(&self) -> usize {
        self.segment.len()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Valid bytes currently held
    pub fn size(&self) -> usize {
        self.size
    }

    /// Logical offset of the first cached byte
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Logical offset just past the last cached byte
    pub fn end_offset(&self) -> u64 {
        self.base_offset + self.size as u64
    }

    /// Current segment generation; bumped whenever the segment is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether `offset` is cached
    pub fn in_range(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.end_offset()
    }

    /// Whether all of `[offset, offset + len)` is cached
    pub fn covers(&self, offset: u64, len: usize) -> bool {
        self.base_offset <= offset && offset + len as u64 <= self.end_offset()
    }

    /// The cached window
    pub fn available(&self) -> FileRange {
        FileRange::new(self.base_offset, self.size as u64)
    }

    /// Cached bytes from `start` to the end of the window
    ///
    /// `start` may equal the end offset, which yields an empty slice.
    pub fn get_range(&self, start: u64) -> Option<&[u8]> {
        if start < self.base_offset || start > self.end_offset() {
            return None;
        }
        let skip = (start - self.base_offset) as usize;
        Some(&self.segment[skip..self.size])
    }

    /// Shared view of `[offset, offset + len)`, if it is cached
    pub fn view(&self, offset: u64, len: usize) -> Option<BufferView> {
        if !self.covers(offset, len) {
            return None;
        }
        let start = (offset - self.base_offset) as usize;
        Some(BufferView::new(
            Arc::clone(&self.segment),
            start,
            len,
            offset,
            self.generation,
        ))
    }

    /// Make room for `max_length` bytes starting at `start`
    ///
    /// Bytes already cached at `start` survive, and so do the bytes before
    /// it until the segment runs out of spare room. Once the segment is full
    /// without covering the request, the bytes from `start` on are moved to
    /// the front. When `start` is behind the window and the final size of the
    /// stream is known, the new window is placed so that it ends at the end
    /// of the stream.
    pub fn ensure_available(
        &mut self,
        start: u64,
        max_length: usize,
        final_size: Option<u64>,
    ) -> LineBufferResult<()> {
        if max_length > self.max_capacity {
            return Err(LineBufferError::LineTooLong {
                offset: start,
                limit: self.max_capacity,
            });
        }

        if self.capacity() < max_length {
            self.grow(start, max_length);
        }

        if start < self.base_offset || start > self.end_offset() {
            let mut base = start;
            if start < self.base_offset
                && let Some(size) = final_size
                && start < size
            {
                base = size.saturating_sub(self.capacity() as u64).min(start);
            }
            trace!("cache window moved to {} for offset {}", base, start);
            self.base_offset = base;
            self.size = 0;
        }

        // A full segment has no room for the next read
        if self.size == self.capacity() && !self.covers(start, max_length) {
            self.relocate(start);
        }

        Ok(())
    }

    /// Writable space after the valid bytes, and the logical offset it starts at
    ///
    /// While any [`BufferView`] still shares the segment, this first moves
    /// the valid bytes into a fresh allocation of the same capacity. Holding
    /// a view across fills therefore costs one copy of the window per fill;
    /// see [`CacheStats::detached_bytes`].
    pub fn spare_mut(&mut self) -> (u64, &mut [u8]) {
        if self.is_shared() {
            self.detach(0);
        }
        let offset = self.end_offset();
        let size = self.size;
        (offset, &mut Arc::make_mut(&mut self.segment)[size..])
    }

    /// Mark `n` bytes of the spare area as valid
    pub fn commit(&mut self, n: usize) {
        let n = n.min(self.capacity() - self.size);
        self.size += n;
        self.stats.fills += 1;
        self.stats.bytes_filled += n as u64;
    }

    /// Drop the cached bytes, keeping the allocation and window position
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Drop the cached bytes and rewind the window to offset 0
    pub fn reset(&mut self) {
        self.size = 0;
        self.base_offset = 0;
    }

    fn is_shared(&self) -> bool {
        Arc::strong_count(&self.segment) > 1
    }

    fn replace_segment(&mut self, segment: Vec<u8>) {
        self.segment = Arc::new(segment);
        self.generation += 1;
    }

    /// Continue in a fresh segment of the same capacity, keeping the valid
    /// bytes from `skip` onwards
    fn detach(&mut self, skip: usize) {
        let keep = self.size - skip;
        let mut fresh = vec![0u8; self.capacity()];
        fresh[..keep].copy_from_slice(&self.segment[skip..self.size]);
        self.replace_segment(fresh);
        self.base_offset += skip as u64;
        self.size = keep;
        self.stats.detached_copies += 1;
        self.stats.detached_bytes += keep as u64;
        debug!(
            "Detached cache segment with live views (generation {})",
            self.generation
        );
    }

    /// Move the bytes at `start` to the front of the segment
    fn relocate(&mut self, start: u64) {
        let skip = (start - self.base_offset) as usize;
        if skip == 0 {
            return;
        }
        if skip >= self.size {
            self.base_offset = start;
            self.size = 0;
            return;
        }
        if self.is_shared() {
            self.detach(skip);
        } else {
            let size = self.size;
            Arc::make_mut(&mut self.segment).copy_within(skip..size, 0);
            self.base_offset = start;
            self.size -= skip;
        }
        self.stats.relocations += 1;
        trace!("relocated cache to offset {} ({} bytes kept)", start, self.size);
    }

    fn grow(&mut self, start: u64, max_length: usize) {
        let rounded = max_length.div_ceil(self.growth_increment) * self.growth_increment;
        let capacity = rounded
            .max(self.capacity().saturating_mul(2))
            .min(self.max_capacity)
            .max(max_length);

        let mut fresh = vec![0u8; capacity];
        if self.base_offset <= start && start <= self.end_offset() {
            fresh[..self.size].copy_from_slice(&self.segment[..self.size]);
        } else {
            self.size = 0;
        }

        debug!(
            "Resized cache from {} to {} bytes",
            self.capacity(),
            capacity
        );
        self.replace_segment(fresh);
        self.stats.reallocations += 1;
    }
}

impl fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteCache")
            .field("base_offset", &self.base_offset)
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
