//! Line framing engine
//!
//! [`LineBuffer`] frames delimiter-terminated lines over an attached file
//! descriptor. Callers drive iteration themselves by passing each returned
//! range back in as the previous line.

use logview_gzindex::InflateStats;
use std::fs::File;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::cache::{ByteCache, CacheStats};
use crate::config::LineBufferConfig;
use crate::error::{LineBufferError, LineBufferResult};
use crate::range::{FileRange, LineInfo};
use crate::source::{ReadOutcome, Source};
use crate::view::BufferView;

/// Outcome of a single fill attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// The requested bytes were already cached
    Cached,
    /// New bytes were read
    Read(usize),
    /// The source has no more data
    Eof,
    /// The read would have blocked
    Pending,
}

/// Line-oriented reader over a file, pipe or gzip file
#[derive(Debug)]
pub struct LineBuffer {
    config: LineBufferConfig,
    cache: ByteCache,
    source: Option<Source>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        let config = LineBufferConfig::default();
        let cache = ByteCache::new(config.max_capacity, config.growth_increment);
        Self {
            config,
            cache,
            source: None,
        }
    }
}

impl LineBuffer {
    /// Create an unattached line buffer
    pub fn new(config: LineBufferConfig) -> LineBufferResult<Self> {
        config
            .validate()
            .map_err(LineBufferError::InvalidConfiguration)?;
        let cache = ByteCache::new(config.max_capacity, config.growth_increment);
        Ok(Self {
            config,
            cache,
            source: None,
        })
    }

    pub fn config(&self) -> &LineBufferConfig {
        &self.config
    }

    /// Attach a descriptor, replacing any previous one
    ///
    /// Regular files are treated as seekable and checked for gzip magic;
    /// anything else is read as a pipe.
    pub fn attach(&mut self, file: File) -> LineBufferResult<()> {
        self.reset();
        let source = Source::open(file, &self.config.gz)?;
        debug!(
            "Attached source: pipe={}, compressed={}",
            source.is_pipe(),
            source.is_compressed()
        );
        self.source = Some(source);
        Ok(())
    }

    /// Release the descriptor, cached bytes and checkpoint index
    pub fn reset(&mut self) {
        if self.source.take().is_some() {
            debug!("Detached source");
        }
        self.cache.reset();
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Size of the logical stream, if known
    ///
    /// Pipes report the number of bytes read once they have closed; gzip
    /// files report their decompressed size once the end has been reached.
    pub fn get_file_size(&self) -> Option<u64> {
        self.source.as_ref().and_then(Source::file_size)
    }

    pub fn is_pipe(&self) -> bool {
        self.source.as_ref().is_some_and(Source::is_pipe)
    }

    /// A pipe whose end has been read
    pub fn is_pipe_closed(&self) -> bool {
        self.source.as_ref().is_some_and(Source::is_pipe_closed)
    }

    pub fn is_compressed(&self) -> bool {
        self.source.as_ref().is_some_and(Source::is_compressed)
    }

    /// Modification time from the gzip header, or from file metadata
    pub fn file_time(&self) -> Option<SystemTime> {
        self.source.as_ref().and_then(Source::modified)
    }

    /// Offset to compare against the on-disk size when polling for growth
    ///
    /// For gzip sources this is the compressed read position; otherwise it
    /// is `offset` itself.
    pub fn get_read_offset(&self, offset: u64) -> u64 {
        self.source
            .as_ref()
            .and_then(Source::compressed_offset)
            .unwrap_or(offset)
    }

    /// Whether data may exist at `offset`, given the size reported by stat
    pub fn is_data_available(&self, offset: u64, stat_size: u64) -> bool {
        if self.is_compressed() {
            return self.get_file_size().is_none_or(|size| offset < size);
        }
        offset < stat_size
    }

    /// Range currently held in the cache
    pub fn get_available(&self) -> FileRange {
        self.cache.available()
    }

    /// Drop cached bytes without detaching
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn inflate_stats(&self) -> Option<InflateStats> {
        self.source.as_ref().and_then(Source::inflate_stats)
    }

    /// Checkpoints captured in the gzip index
    pub fn checkpoint_count(&self) -> usize {
        self.source.as_ref().map_or(0, Source::checkpoint_count)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Frame the line that starts where `prev_line` ends
    ///
    /// Pass `FileRange::default()` to start at the beginning. An empty,
    /// non-partial result means no data is available at that offset yet.
    pub fn load_next_line(&mut self, prev_line: FileRange) -> LineBufferResult<LineInfo> {
        let start = prev_line.next_offset();
        let source = self.source.as_ref().ok_or(LineBufferError::NotAttached)?;
        let is_pipe = source.is_pipe();
        if is_pipe {
            self.check_pipe_offset(start, 0)?;
        }

        let delimiter = self.config.delimiter;
        let max = self.config.max_capacity;
        let mut request = self.config.default_capacity.min(max);
        let mut retries = self.config.grow_retries;

        loop {
            let fill = self.fill_range(start, request)?;
            let cached = self.cache.get_range(start).unwrap_or_default();

            if let Some(pos) = memchr::memchr(delimiter, cached) {
                return Ok(frame(cached, start, pos + 1, false));
            }

            let have = cached.len();
            match fill {
                Fill::Eof | Fill::Pending => return Ok(frame(cached, start, have, have > 0)),
                Fill::Read(_) if is_pipe && have < request => {
                    return Ok(frame(cached, start, have, have > 0));
                }
                Fill::Read(_) if have < request => {}
                Fill::Read(_) | Fill::Cached => {
                    if retries == 0 || request >= max {
                        warn!(
                            "Line at offset {} is longer than {} bytes",
                            start, request
                        );
                        return Err(LineBufferError::LineTooLong {
                            offset: start,
                            limit: request,
                        });
                    }
                    retries -= 1;
                    request = if retries == 0 {
                        max
                    } else {
                        request.saturating_mul(2).min(max)
                    };
                    debug!(
                        "No delimiter within lookahead at offset {}, retrying with {} bytes",
                        start, request
                    );
                }
            }
        }
    }

    /// Shared view of an arbitrary byte range
    ///
    /// Ranges behind the cache are re-read; for gzip sources the index jumps
    /// back to the nearest checkpoint.
    pub fn read_range(&mut self, range: FileRange) -> LineBufferResult<BufferView> {
        let source = self.source.as_ref().ok_or(LineBufferError::NotAttached)?;
        let len = usize::try_from(range.size)
            .ok()
            .filter(|&len| len <= self.config.max_capacity)
            .ok_or(LineBufferError::LineTooLong {
                offset: range.offset,
                limit: self.config.max_capacity,
            })?;
        if source.is_pipe() {
            self.check_pipe_offset(range.offset, range.size)?;
        }

        loop {
            if let Some(view) = self.cache.view(range.offset, len) {
                return Ok(view);
            }
            match self.fill_range(range.offset, len)? {
                Fill::Read(_) => {}
                Fill::Cached | Fill::Eof | Fill::Pending => {
                    let available = self.cache.end_offset();
                    return self.cache.view(range.offset, len).ok_or(
                        LineBufferError::InvalidRange {
                            offset: range.offset,
                            size: range.size,
                            available,
                        },
                    );
                }
            }
        }
    }

    /// Pipes cannot rewind behind the cache or skip ahead of the read position
    fn check_pipe_offset(&self, offset: u64, size: u64) -> LineBufferResult<()> {
        let position = self
            .source
            .as_ref()
            .and_then(Source::pipe_position)
            .unwrap_or(0);
        if offset < self.cache.base_offset() || offset > position {
            return Err(LineBufferError::InvalidRange {
                offset,
                size,
                available: position,
            });
        }
        Ok(())
    }

    /// Make sure `max_length` bytes from `start` are cached, reading once if not
    fn fill_range(&mut self, start: u64, max_length: usize) -> LineBufferResult<Fill> {
        let source = self.source.as_mut().ok_or(LineBufferError::NotAttached)?;

        self.cache
            .ensure_available(start, max_length, source.placement_size())?;
        if self.cache.covers(start, max_length) {
            return Ok(Fill::Cached);
        }

        let (offset, spare) = self.cache.spare_mut();
        if spare.is_empty() {
            return Ok(Fill::Cached);
        }

        match source.read_at(spare, offset)? {
            ReadOutcome::Data(n) => {
                self.cache.commit(n);
                Ok(Fill::Read(n))
            }
            ReadOutcome::Eof => Ok(Fill::Eof),
            ReadOutcome::Pending => Ok(Fill::Pending),
        }
    }
}

/// Build the descriptor for `cached[..len]`, a line starting at `start`
fn frame(cached: &[u8], start: u64, len: usize, partial: bool) -> LineInfo {
    LineInfo {
        range: FileRange::new(start, len as u64),
        partial,
        valid_utf: std::str::from_utf8(&cached[..len]).is_ok(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn attached(contents: &[u8], config: LineBufferConfig) -> LineBuffer {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(contents).unwrap();
        let mut buffer = LineBuffer::new(config).unwrap();
        buffer.attach(file).unwrap();
        buffer
    }

    fn small_config() -> LineBufferConfig {
        LineBufferConfig::new()
            .with_default_capacity(16)
            .with_max_capacity(64)
            .with_growth_increment(16)
    }

    #[test]
    fn test_unattached_operations_fail() {
        let mut buffer = LineBuffer::default();
        assert!(matches!(
            buffer.load_next_line(FileRange::default()),
            Err(LineBufferError::NotAttached)
        ));
        assert!(matches!(
            buffer.read_range(FileRange::new(0, 1)),
            Err(LineBufferError::NotAttached)
        ));
        assert!(!buffer.is_pipe());
        assert_eq!(buffer.get_file_size(), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LineBufferConfig::new().with_default_capacity(0);
        assert!(matches!(
            LineBuffer::new(config),
            Err(LineBufferError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_lines_longer_than_lookahead_grow() {
        let mut contents = vec![b'x'; 40];
        contents.push(b'\n');
        contents.extend_from_slice(b"short\n");
        let mut buffer = attached(&contents, small_config());

        let first = buffer.load_next_line(FileRange::default()).unwrap();
        assert_eq!(first.range, FileRange::new(0, 41));
        let second = buffer.load_next_line(first.range).unwrap();
        assert_eq!(second.range, FileRange::new(41, 6));
        assert!(buffer.cache_stats().reallocations >= 1);
    }

    #[test]
    fn test_no_retries_limits_to_lookahead() {
        let contents = vec![b'y'; 40];
        let mut buffer = attached(&contents, small_config().with_grow_retries(0));
        let err = buffer.load_next_line(FileRange::default()).unwrap_err();
        assert!(matches!(
            err,
            LineBufferError::LineTooLong {
                offset: 0,
                limit: 16
            }
        ));
    }

    #[test]
    fn test_custom_delimiter() {
        let mut buffer = attached(b"a\0bb\0", small_config().with_delimiter(0));
        let first = buffer.load_next_line(FileRange::default()).unwrap();
        assert_eq!(first.range, FileRange::new(0, 2));
        let second = buffer.load_next_line(first.range).unwrap();
        assert_eq!(second.range, FileRange::new(2, 3));
    }

    #[test]
    fn test_invalid_utf8_flagged() {
        let mut buffer = attached(b"ok\n\xff\xfe\n", small_config());
        let first = buffer.load_next_line(FileRange::default()).unwrap();
        assert!(first.valid_utf);
        let second = buffer.load_next_line(first.range).unwrap();
        assert!(!second.valid_utf);
        assert_eq!(second.range, FileRange::new(3, 3));
    }

    #[test]
    fn test_read_range_past_end() {
        let mut buffer = attached(b"abc\n", small_config());
        let err = buffer.read_range(FileRange::new(2, 5)).unwrap_err();
        assert!(matches!(
            err,
            LineBufferError::InvalidRange {
                offset: 2,
                size: 5,
                available: 4
            }
        ));

        let view = buffer.read_range(FileRange::new(1, 3)).unwrap();
        assert_eq!(view.as_slice(), b"bc\n");
    }

    #[test]
    fn test_reset_detaches() {
        let mut buffer = attached(b"abc\n", small_config());
        buffer.load_next_line(FileRange::default()).unwrap();
        buffer.reset();
        assert!(!buffer.is_attached());
        assert_eq!(buffer.get_available(), FileRange::default());
    }

    #[test]
    fn test_data_availability_for_plain_files() {
        let buffer = attached(b"abc\n", small_config());
        assert!(buffer.is_data_available(3, 4));
        assert!(!buffer.is_data_available(4, 4));
        assert_eq!(buffer.get_read_offset(3), 3);
        assert!(buffer.file_time().is_some());
    }
}
