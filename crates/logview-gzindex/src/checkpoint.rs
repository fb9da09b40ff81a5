//! Resumable decompression checkpoints
//!
//! A checkpoint records everything a fresh inflater needs to pick up a
//! deflate stream at a block boundary: where the block starts in the
//! compressed input (down to the bit), how much output precedes it, and the
//! 32 KiB of output that back-references may reach into.

use std::fmt;

/// Deflate's maximum back-reference distance
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Decompressor state captured at a deflate block boundary
#[derive(Clone)]
pub struct Checkpoint {
    compressed_offset: u64,
    logical_offset: u64,
    bit_offset: u8,
    carry_bits: u8,
    window: Box<[u8]>,
}

impl Checkpoint {
    /// Build a checkpoint
    ///
    /// Returns `None` unless `window` is exactly [`WINDOW_SIZE`] bytes, the
    /// bit offset is below 8, and at least a full window of output precedes
    /// `logical_offset`.
    pub fn new(
        compressed_offset: u64,
        logical_offset: u64,
        bit_offset: u8,
        carry_bits: u8,
        window: Box<[u8]>,
    ) -> Option<Self> {
        if window.len() != WINDOW_SIZE
            || bit_offset > 7
            || logical_offset < WINDOW_SIZE as u64
        {
            return None;
        }
        Some(Self {
            compressed_offset,
            logical_offset,
            bit_offset,
            // Only the low `bit_offset` bits are meaningful
            carry_bits: carry_bits & ((1u16 << bit_offset) - 1) as u8,
            window,
        })
    }

    /// Offset of the first whole compressed byte after the block boundary
    pub fn compressed_offset(&self) -> u64 {
        self.compressed_offset
    }

    /// Number of decompressed bytes preceding the block boundary
    pub fn logical_offset(&self) -> u64 {
        self.logical_offset
    }

    /// Bits of the previous compressed byte that belong to the next block
    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    /// The unconsumed bits themselves, right-aligned
    pub fn carry_bits(&self) -> u8 {
        self.carry_bits
    }

    /// The last [`WINDOW_SIZE`] bytes of output before the boundary
    pub fn window(&self) -> &[u8] {
        &self.window
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("compressed_offset", &self.compressed_offset)
            .field("logical_offset", &self.logical_offset)
            .field("bit_offset", &self.bit_offset)
            .field("carry_bits", &self.carry_bits)
            .finish_non_exhaustive()
    }
}

/// Append-only list of checkpoints ordered by offset
#[derive(Debug, Default, Clone)]
pub struct CheckpointIndex {
    points: Vec<Checkpoint>,
}

impl CheckpointIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no checkpoint has been captured yet
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate checkpoints in offset order
    pub fn iter(&self) -> std::slice::Iter<'_, Checkpoint> {
        self.points.iter()
    }

    /// Most recently captured checkpoint
    pub fn last(&self) -> Option<&Checkpoint> {
        self.points.last()
    }

    /// Highest logical offset covered by a checkpoint
    pub fn highest_logical_offset(&self) -> Option<u64> {
        self.last().map(Checkpoint::logical_offset)
    }

    /// Latest checkpoint with `logical_offset <= offset`
    pub fn latest_at_or_before(&self, offset: u64) -> Option<&Checkpoint> {
        let idx = self
            .points
            .partition_point(|point| point.logical_offset <= offset);
        idx.checked_sub(1).map(|i| &self.points[i])
    }

    /// Whether a boundary at `compressed_offset` is far enough past the last
    /// checkpoint to deserve its own
    pub fn wants(&self, compressed_offset: u64, logical_offset: u64, spacing: u64) -> bool {
        match self.last() {
            None => true,
            Some(last) => {
                logical_offset > last.logical_offset
                    && compressed_offset > last.compressed_offset
                    && compressed_offset - last.compressed_offset >= spacing
            }
        }
    }

    /// Append a checkpoint, refusing any that would break the ordering
    pub fn push(&mut self, checkpoint: Checkpoint) -> bool {
        if let Some(last) = self.last()
            && (checkpoint.logical_offset <= last.logical_offset
                || checkpoint.compressed_offset <= last.compressed_offset)
        {
            return false;
        }
        self.points.push(checkpoint);
        true
    }

    /// Approximate heap bytes held by dictionary windows
    pub fn memory_usage(&self) -> usize {
        self.points.len() * WINDOW_SIZE
    }
}

impl<'a> IntoIterator for &'a CheckpointIndex {
    type Item = &'a Checkpoint;
    type IntoIter = std::slice::Iter<'a, Checkpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn point(compressed: u64, logical: u64) -> Checkpoint {
        Checkpoint::new(compressed, logical, 3, 0xff, vec![0u8; WINDOW_SIZE].into()).unwrap()
    }

    #[test]
    fn test_checkpoint_guards() {
        let window: Box<[u8]> = vec![0u8; WINDOW_SIZE].into();
        assert!(Checkpoint::new(10, WINDOW_SIZE as u64, 0, 0, window.clone()).is_some());
        assert!(Checkpoint::new(10, WINDOW_SIZE as u64 - 1, 0, 0, window.clone()).is_none());
        assert!(Checkpoint::new(10, 100_000, 8, 0, window).is_none());
        assert!(Checkpoint::new(10, 100_000, 0, 0, vec![0u8; 100].into()).is_none());
    }

    #[test]
    fn test_carry_bits_masked() {
        assert_eq!(point(1, 40_000).carry_bits(), 0b111);
    }

    #[test]
    fn test_latest_at_or_before() {
        let mut index = CheckpointIndex::new();
        assert!(index.latest_at_or_before(1_000_000).is_none());

        assert!(index.push(point(100, 40_000)));
        assert!(index.push(point(200, 80_000)));
        assert!(index.push(point(300, 120_000)));

        assert!(index.latest_at_or_before(39_999).is_none());
        assert_eq!(index.latest_at_or_before(40_000).unwrap().compressed_offset(), 100);
        assert_eq!(index.latest_at_or_before(119_999).unwrap().compressed_offset(), 200);
        assert_eq!(index.latest_at_or_before(u64::MAX).unwrap().compressed_offset(), 300);
        assert_eq!(index.highest_logical_offset(), Some(120_000));
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let mut index = CheckpointIndex::new();
        assert!(index.push(point(200, 80_000)));
        assert!(!index.push(point(100, 90_000)));
        assert!(!index.push(point(300, 80_000)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_spacing() {
        let mut index = CheckpointIndex::new();
        assert!(index.wants(50, 40_000, 1024));
        index.push(point(50, 40_000));

        assert!(!index.wants(500, 50_000, 1024));
        assert!(index.wants(1074, 50_000, 1024));
        assert!(!index.wants(2000, 40_000, 0));
        assert!(index.wants(51, 40_001, 0));
        assert_eq!(index.memory_usage(), WINDOW_SIZE);
    }
}
