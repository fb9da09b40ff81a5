//! Inflate activity counters

use serde::Serialize;

/// Counters describing how much decompression work a reader has done
///
/// Callers can diff two snapshots with [`InflateStats::since`] to measure the
/// cost of a single read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InflateStats {
    /// Calls into the inflater
    pub inflate_calls: u64,
    /// Decompressed bytes produced, including bytes skipped to reach an offset
    pub bytes_inflated: u64,
    /// Times inflation resumed from a checkpoint
    pub checkpoint_resumes: u64,
    /// Times inflation started over from the first member header
    pub stream_starts: u64,
    /// Checkpoints appended to the index
    pub checkpoints_captured: u64,
}

impl InflateStats {
    /// Work done between `earlier` and `self`
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            inflate_calls: self.inflate_calls.saturating_sub(earlier.inflate_calls),
            bytes_inflated: self.bytes_inflated.saturating_sub(earlier.bytes_inflated),
            checkpoint_resumes: self
                .checkpoint_resumes
                .saturating_sub(earlier.checkpoint_resumes),
            stream_starts: self.stream_starts.saturating_sub(earlier.stream_starts),
            checkpoints_captured: self
                .checkpoints_captured
                .saturating_sub(earlier.checkpoints_captured),
        }
    }
}
