//! Memoized random-access reader over a compressed stream
//!
//! The reader inflates forward on demand and, whenever the inflater stops at
//! a deflate block boundary far enough past the previous checkpoint, records
//! a [`Checkpoint`]. Later reads behind the current position resume from the
//! nearest checkpoint instead of starting over from the first byte.

use byteorder::{ByteOrder, LittleEndian};
use flate2::Crc;
use miniz_oxide::inflate::TINFLStatus;
use miniz_oxide::inflate::core::{
    BlockBoundaryState, DecompressorOxide, decompress, inflate_flags,
};
use tracing::{debug, trace, warn};

use crate::checkpoint::{Checkpoint, CheckpointIndex, WINDOW_SIZE};
use crate::config::GzIndexConfig;
use crate::error::{GzIndexError, GzIndexResult};
use crate::header::{ContainerFormat, GZIP_MAGIC, GzipHeader, parse_zlib_header};
use crate::source::PositionedRead;
use crate::stats::InflateStats;

/// Ring buffer for inflater output; a power of two holding two windows
const OUTPUT_BUF_SIZE: usize = 2 * WINDOW_SIZE;

/// Where an open inflate stream currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPosition {
    /// Compressed bytes consumed by the inflater
    pub compressed: u64,
    /// Logical offset of the next byte the reader will return
    pub logical: u64,
}

enum InflateState {
    /// No stream has been opened yet, or the reader was closed
    Closed,
    /// An inflater is open and can continue forward
    Streaming(Box<Stream>),
    /// The last member ended; reads behind the end must reopen
    Exhausted,
}

/// One open inflater plus its input and output buffers
struct Stream {
    decomp: Box<DecompressorOxide>,

    input: Vec<u8>,
    input_offset: usize,
    input_size: usize,
    /// Compressed offset of `input[input_offset]`
    input_pos: u64,

    /// Circular buffer of `OUTPUT_BUF_SIZE` bytes
    output: Vec<u8>,
    /// Logical offset of the next byte the inflater writes
    output_pos: u64,
    /// Logical offset of the next byte returned to the caller
    output_ret: u64,

    /// Current member's deflate data has ended
    finished: bool,
    /// Running CRC-32, only kept when the member was inflated from its start
    crc: Option<Crc>,
}

impl Stream {
    fn new(
        decomp: Box<DecompressorOxide>,
        input_pos: u64,
        logical_pos: u64,
        input_buffer_size: usize,
        crc: Option<Crc>,
    ) -> Self {
        Self {
            decomp,
            input: vec![0; input_buffer_size],
            input_offset: 0,
            input_size: 0,
            input_pos,
            output: vec![0; OUTPUT_BUF_SIZE],
            output_pos: logical_pos,
            output_ret: logical_pos,
            finished: false,
            crc,
        }
    }

    fn from_checkpoint(checkpoint: &Checkpoint, input_buffer_size: usize) -> Self {
        let state = BlockBoundaryState {
            num_bits: checkpoint.bit_offset(),
            bit_buf: checkpoint.carry_bits(),
            ..Default::default()
        };
        let decomp = Box::new(DecompressorOxide::from_block_boundary_state(&state));

        let mut stream = Self::new(
            decomp,
            checkpoint.compressed_offset(),
            checkpoint.logical_offset(),
            input_buffer_size,
            None,
        );
        stream.place_window(checkpoint.window());
        stream
    }

    fn has_output(&self) -> bool {
        self.output_pos != self.output_ret
    }

    fn pending(&self) -> u64 {
        self.output_pos - self.output_ret
    }

    /// Compressed offset of the next byte that will be read from the source
    fn read_position(&self) -> u64 {
        self.input_pos + (self.input_size - self.input_offset) as u64
    }

    /// Discard up to `limit` bytes of pending output
    fn skip(&mut self, limit: u64) -> u64 {
        let n = self.pending().min(limit);
        self.output_ret += n;
        n
    }

    /// Copy pending output into `dst`
    fn copy_into(&mut self, dst: &mut [u8]) -> usize {
        let n = (self.pending() as usize).min(dst.len());
        let start = (self.output_ret % OUTPUT_BUF_SIZE as u64) as usize;
        let first = n.min(OUTPUT_BUF_SIZE - start);
        dst[..first].copy_from_slice(&self.output[start..start + first]);
        dst[first..n].copy_from_slice(&self.output[..n - first]);
        self.output_ret += n as u64;
        n
    }

    /// The `WINDOW_SIZE` bytes written just before `output_pos`
    fn window(&self) -> Box<[u8]> {
        let mut window = vec![0u8; WINDOW_SIZE];
        let end = (self.output_pos % OUTPUT_BUF_SIZE as u64) as usize;
        let start = (end + OUTPUT_BUF_SIZE - WINDOW_SIZE) % OUTPUT_BUF_SIZE;
        if start < end {
            window.copy_from_slice(&self.output[start..end]);
        } else {
            let first = OUTPUT_BUF_SIZE - start;
            window[..first].copy_from_slice(&self.output[start..]);
            window[first..].copy_from_slice(&self.output[..end]);
        }
        window.into_boxed_slice()
    }

    /// Inverse of [`Stream::window`], used when resuming
    fn place_window(&mut self, window: &[u8]) {
        let end = (self.output_pos % OUTPUT_BUF_SIZE as u64) as usize;
        let start = (end + OUTPUT_BUF_SIZE - WINDOW_SIZE) % OUTPUT_BUF_SIZE;
        if start < end {
            self.output[start..end].copy_from_slice(window);
        } else {
            let first = OUTPUT_BUF_SIZE - start;
            self.output[start..].copy_from_slice(&window[..first]);
            self.output[..end].copy_from_slice(&window[first..]);
        }
    }

    /// Run the inflater once. All previous output must have been drained.
    fn make_progress<R: PositionedRead + ?Sized>(
        &mut self,
        source: &R,
    ) -> GzIndexResult<(TINFLStatus, usize)> {
        debug_assert!(!self.has_output());

        if self.input_offset >= self.input_size {
            self.input_offset = 0;
            self.input_size = source.read_full_at(&mut self.input, self.input_pos)?;
        }

        let mut flags = inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY;
        if self.input_size > 0 {
            flags |= inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        }

        let out_start = (self.output_pos % OUTPUT_BUF_SIZE as u64) as usize;
        let (status, consumed, produced) = decompress(
            &mut self.decomp,
            &self.input[self.input_offset..self.input_size],
            &mut self.output,
            out_start,
            flags,
        );

        self.input_offset += consumed;
        self.input_pos += consumed as u64;

        if let Some(crc) = self.crc.as_mut() {
            crc.update(&self.output[out_start..out_start + produced]);
        }
        self.output_pos += produced as u64;

        if status == TINFLStatus::Done {
            self.finished = true;
        }

        Ok((status, produced))
    }

    /// Reset the inflater for the next gzip member starting at `data_start`
    fn start_member(&mut self, data_start: u64, crc: Option<Crc>) {
        *self.decomp = DecompressorOxide::new();
        self.input_offset = 0;
        self.input_size = 0;
        self.input_pos = data_start;
        self.finished = false;
        self.crc = crc;
    }
}

/// Random-access reader over a gzip, zlib or raw deflate source
///
/// Reads address the decompressed ("logical") stream. The checkpoint index
/// only grows, and only for regions that have actually been inflated.
pub struct IndexedGzReader<R> {
    source: R,
    config: GzIndexConfig,
    format: ContainerFormat,
    header: Option<GzipHeader>,
    /// Compressed offset where the first member's deflate data begins
    data_start: u64,
    checkpoints: CheckpointIndex,
    state: InflateState,
    stats: InflateStats,
    logical_size: Option<u64>,
    compressed_end: Option<u64>,
}

impl<R: PositionedRead> IndexedGzReader<R> {
    /// Open a gzip or zlib source with the default configuration
    pub fn open(source: R) -> GzIndexResult<Self> {
        Self::with_config(source, GzIndexConfig::default())
    }

    /// Open a gzip or zlib source, detecting the container from its magic
    pub fn with_config(source: R, config: GzIndexConfig) -> GzIndexResult<Self> {
        let format = ContainerFormat::detect(&source)?;
        if format == ContainerFormat::Raw {
            return Err(GzIndexError::UnsupportedFormat(
                "source is neither gzip nor zlib".to_string(),
            ));
        }
        Self::with_format(source, format, config)
    }

    /// Open a source whose container is already known
    pub fn with_format(
        source: R,
        format: ContainerFormat,
        config: GzIndexConfig,
    ) -> GzIndexResult<Self> {
        config.validate().map_err(GzIndexError::InvalidConfig)?;

        let (header, data_start) = match format {
            ContainerFormat::Gzip => {
                let header = GzipHeader::parse(&source, 0)?;
                let start = header.header_len;
                (Some(header), start)
            }
            ContainerFormat::Zlib => (None, parse_zlib_header(&source, 0)?),
            ContainerFormat::Raw => (None, 0),
        };

        debug!(
            "Opened {:?} stream, deflate data at offset {}",
            format, data_start
        );

        Ok(Self {
            source,
            config,
            format,
            header,
            data_start,
            checkpoints: CheckpointIndex::new(),
            state: InflateState::Closed,
            stats: InflateStats::default(),
            logical_size: None,
            compressed_end: None,
        })
    }

    /// Decompress bytes `[offset, offset + buf.len())` of the logical stream
    ///
    /// Returns the number of bytes written, which is short only at the end
    /// of the stream (0 when `offset` is at or past it).
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> GzIndexResult<usize> {
        if buf.is_empty() || self.logical_size.is_some_and(|size| offset >= size) {
            return Ok(0);
        }

        self.seek(offset)?;

        let mut filled = 0;
        while filled < buf.len() {
            let InflateState::Streaming(stream) = &mut self.state else {
                break;
            };
            if stream.has_output() {
                filled += stream.copy_into(&mut buf[filled..]);
                continue;
            }
            if !self.advance()? {
                break;
            }
        }

        trace!("read {} bytes at logical offset {}", filled, offset);
        Ok(filled)
    }

    /// Position the stream so the next returned byte is `offset`
    fn seek(&mut self, offset: u64) -> GzIndexResult<()> {
        let current = match &self.state {
            InflateState::Streaming(stream) => Some(stream.output_ret),
            InflateState::Closed | InflateState::Exhausted => None,
        };
        let nearest = self
            .checkpoints
            .latest_at_or_before(offset)
            .map(Checkpoint::logical_offset);

        let keep_going = match (current, nearest) {
            (Some(pos), Some(point)) => point <= pos && pos <= offset,
            (Some(pos), None) => pos <= offset,
            (None, _) => false,
        };

        if !keep_going {
            if let Some(checkpoint) = self.checkpoints.latest_at_or_before(offset) {
                debug!(
                    "Resuming at checkpoint: logical={}, compressed={}, bits={} (target {})",
                    checkpoint.logical_offset(),
                    checkpoint.compressed_offset(),
                    checkpoint.bit_offset(),
                    offset
                );
                let stream = Stream::from_checkpoint(checkpoint, self.config.input_buffer_size);
                self.state = InflateState::Streaming(Box::new(stream));
                self.stats.checkpoint_resumes += 1;
            } else {
                self.restart();
            }
        }

        loop {
            let InflateState::Streaming(stream) = &mut self.state else {
                return Ok(());
            };
            let remaining = offset - stream.output_ret;
            if remaining == 0 {
                return Ok(());
            }
            if stream.has_output() {
                stream.skip(remaining);
                continue;
            }
            if !self.advance()? {
                return Ok(());
            }
        }
    }

    fn restart(&mut self) {
        debug!("Starting inflate from the first member");
        let crc = self.member_crc();
        let stream = Stream::new(
            Box::new(DecompressorOxide::new()),
            self.data_start,
            0,
            self.config.input_buffer_size,
            crc,
        );
        self.state = InflateState::Streaming(Box::new(stream));
        self.stats.stream_starts += 1;
    }

    fn member_crc(&self) -> Option<Crc> {
        (self.format == ContainerFormat::Gzip && self.config.verify_checksums).then(Crc::new)
    }

    /// Produce more output, returning `false` once the stream has ended
    fn advance(&mut self) -> GzIndexResult<bool> {
        let crc = self.member_crc();
        let Self {
            source,
            config,
            format,
            checkpoints,
            state,
            stats,
            logical_size,
            compressed_end,
            ..
        } = self;

        let InflateState::Streaming(stream) = state else {
            return Ok(false);
        };

        if stream.finished {
            if finish_member(&*source, *format, config, stream, crc)? {
                return Ok(true);
            }
            let end = stream.output_pos;
            let compressed = stream.input_pos + format.trailer_len();
            debug!(
                "Reached end of compressed stream: {} bytes from {} compressed",
                end, compressed
            );
            *logical_size = Some(end);
            *compressed_end = Some(compressed);
            *state = InflateState::Exhausted;
            return Ok(false);
        }

        let (status, produced) = stream.make_progress(&*source)?;
        stats.inflate_calls += 1;
        stats.bytes_inflated += produced as u64;

        match status {
            TINFLStatus::Done | TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput => Ok(true),
            TINFLStatus::BlockBoundary => {
                capture_checkpoint(checkpoints, config, stats, stream);
                Ok(true)
            }
            TINFLStatus::FailedCannotMakeProgress => Err(GzIndexError::corrupt(
                stream.input_pos,
                "unexpected end of compressed data",
            )),
            other => Err(GzIndexError::corrupt(
                stream.input_pos,
                format!("inflate failed with {other:?}"),
            )),
        }
    }

    /// Container format of the source
    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Header of the first gzip member
    pub fn header(&self) -> Option<&GzipHeader> {
        self.header.as_ref()
    }

    /// Checkpoints captured so far
    pub fn checkpoints(&self) -> &CheckpointIndex {
        &self.checkpoints
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> InflateStats {
        self.stats
    }

    /// Decompressed size, known once the end of the stream has been reached
    pub fn logical_size(&self) -> Option<u64> {
        self.logical_size
    }

    /// How far into the compressed source the reader has read
    pub fn compressed_offset(&self) -> u64 {
        match &self.state {
            InflateState::Streaming(stream) => stream.read_position(),
            InflateState::Exhausted => self.compressed_end.unwrap_or(0),
            InflateState::Closed => 0,
        }
    }

    /// Position of the open stream, if any
    pub fn position(&self) -> Option<StreamPosition> {
        match &self.state {
            InflateState::Streaming(stream) => Some(StreamPosition {
                compressed: stream.input_pos,
                logical: stream.output_ret,
            }),
            InflateState::Closed | InflateState::Exhausted => None,
        }
    }

    /// Drop the open inflater; checkpoints are kept
    pub fn close(&mut self) {
        self.state = InflateState::Closed;
    }

    /// Borrow the compressed source
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Recover the compressed source
    pub fn into_inner(self) -> R {
        self.source
    }
}

/// Record a checkpoint at the block boundary the inflater just stopped on
fn capture_checkpoint(
    checkpoints: &mut CheckpointIndex,
    config: &GzIndexConfig,
    stats: &mut InflateStats,
    stream: &Stream,
) {
    // The dictionary copy is only valid once a full window has been produced
    if stream.finished || stream.output_pos < WINDOW_SIZE as u64 {
        return;
    }
    if !checkpoints.wants(stream.input_pos, stream.output_pos, config.checkpoint_spacing) {
        return;
    }
    let Some(state) = stream.decomp.block_boundary_state() else {
        trace!("no block boundary state at {}", stream.input_pos);
        return;
    };

    // `bit_buf` holds the unread high bits of the last consumed byte
    let bits = state.num_bits;
    let Some(checkpoint) = Checkpoint::new(
        stream.input_pos,
        stream.output_pos,
        bits,
        state.bit_buf,
        stream.window(),
    ) else {
        return;
    };

    if checkpoints.push(checkpoint) {
        stats.checkpoints_captured += 1;
        debug!(
            "Captured checkpoint #{}: compressed={}, logical={}, bits={}",
            checkpoints.len(),
            stream.input_pos,
            stream.output_pos,
            bits
        );
    }
}

/// Handle the end of a member's deflate data
///
/// Returns `true` when another gzip member follows and the stream has been
/// reset to inflate it.
fn finish_member<R: PositionedRead + ?Sized>(
    source: &R,
    format: ContainerFormat,
    config: &GzIndexConfig,
    stream: &mut Stream,
    next_crc: Option<Crc>,
) -> GzIndexResult<bool> {
    if format != ContainerFormat::Gzip {
        return Ok(false);
    }

    let trailer_pos = stream.input_pos;
    let mut trailer = [0u8; 8];
    if source.read_full_at(&mut trailer, trailer_pos)? < trailer.len() {
        return Err(GzIndexError::corrupt(trailer_pos, "truncated gzip trailer"));
    }

    if let Some(crc) = stream.crc.take()
        && config.verify_checksums
    {
        let expected = LittleEndian::read_u32(&trailer[..4]);
        if crc.sum() != expected {
            return Err(GzIndexError::ChecksumMismatch {
                expected,
                actual: crc.sum(),
            });
        }
        let expected = LittleEndian::read_u32(&trailer[4..]);
        if crc.amount() != expected {
            return Err(GzIndexError::LengthMismatch {
                expected,
                actual: crc.amount(),
            });
        }
    }

    let next = trailer_pos + trailer.len() as u64;
    let mut magic = [0u8; 2];
    let n = source.read_full_at(&mut magic, next)?;
    if n == 0 {
        return Ok(false);
    }
    if n < magic.len() || magic != GZIP_MAGIC {
        warn!("Ignoring trailing data after gzip member at offset {}", next);
        return Ok(false);
    }

    let header = GzipHeader::parse(source, next)?;
    debug!("Continuing into gzip member at offset {}", next);
    stream.start_member(next + header.header_len, next_crc);
    Ok(true)
}
