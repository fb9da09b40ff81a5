//! Source adapter: seekable files, gzip files and pipes

use logview_gzindex::{
    ContainerFormat, GZIP_MAGIC, GzIndexConfig, GzipHeader, IndexedGzReader, InflateStats,
    PositionedRead,
};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::time::SystemTime;
use tracing::{debug, trace};

use crate::error::{LineBufferError, LineBufferResult};

/// Result of one read from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Data(usize),
    Eof,
    /// The read was interrupted or would block; more data may follow
    Pending,
}

enum Backend {
    Plain {
        file: File,
        /// Largest size observed so far
        size: u64,
    },
    Gzip(Box<IndexedGzReader<File>>),
    Pipe {
        file: File,
        position: u64,
        closed: bool,
    },
}

/// The descriptor attached to a line buffer
pub(crate) struct Source {
    backend: Backend,
    modified: Option<SystemTime>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("pipe", &self.is_pipe())
            .field("compressed", &self.is_compressed())
            .field("size", &self.file_size())
            .finish_non_exhaustive()
    }
}

/// Positioned read that retries interrupted calls
///
/// Seekable sources have no "pending" state: a read either returns data,
/// reports EOF with 0, or fails.
fn read_seekable<R: PositionedRead + ?Sized>(
    source: &R,
    buf: &mut [u8],
    offset: u64,
) -> io::Result<usize> {
    loop {
        match source.read_at(buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

impl Source {
    /// Classify `file` and, for gzip files, open the index over it
    pub(crate) fn open(file: File, gz: &GzIndexConfig) -> LineBufferResult<Self> {
        let metadata = file.metadata()?;
        let modified = metadata.modified().ok();

        if !metadata.is_file() {
            debug!("Attached non-seekable source");
            return Ok(Self {
                backend: Backend::Pipe {
                    file,
                    position: 0,
                    closed: false,
                },
                modified,
            });
        }

        let mut magic = [0u8; 2];
        let n = file.read_full_at(&mut magic, 0)?;
        if n == magic.len() && magic == GZIP_MAGIC {
            let reader = IndexedGzReader::with_format(file, ContainerFormat::Gzip, gz.clone())?;
            let modified = reader
                .header()
                .and_then(GzipHeader::modified)
                .or(modified);
            debug!(
                "Attached gzip source ({} compressed bytes)",
                metadata.len()
            );
            return Ok(Self {
                backend: Backend::Gzip(Box::new(reader)),
                modified,
            });
        }

        debug!("Attached seekable source ({} bytes)", metadata.len());
        Ok(Self {
            backend: Backend::Plain {
                file,
                size: metadata.len(),
            },
            modified,
        })
    }

    pub(crate) fn is_pipe(&self) -> bool {
        matches!(self.backend, Backend::Pipe { .. })
    }

    pub(crate) fn is_compressed(&self) -> bool {
        matches!(self.backend, Backend::Gzip(_))
    }

    pub(crate) fn is_pipe_closed(&self) -> bool {
        matches!(self.backend, Backend::Pipe { closed: true, .. })
    }

    /// Next offset a pipe read will return, `None` for seekable sources
    pub(crate) fn pipe_position(&self) -> Option<u64> {
        match &self.backend {
            Backend::Pipe { position, .. } => Some(*position),
            Backend::Plain { .. } | Backend::Gzip(_) => None,
        }
    }

    /// Logical size, when known
    ///
    /// Plain files report the largest size seen so far; gzip sources and
    /// pipes only know theirs once the end has been read.
    pub(crate) fn file_size(&self) -> Option<u64> {
        match &self.backend {
            Backend::Plain { size, .. } => Some(*size),
            Backend::Gzip(reader) => reader.logical_size(),
            Backend::Pipe {
                position, closed, ..
            } => closed.then_some(*position),
        }
    }

    /// Size used to place the cache window near the end of the stream
    pub(crate) fn placement_size(&self) -> Option<u64> {
        if self.is_pipe() {
            None
        } else {
            self.file_size()
        }
    }

    /// Position in the compressed file, for gzip sources
    pub(crate) fn compressed_offset(&self) -> Option<u64> {
        match &self.backend {
            Backend::Gzip(reader) => Some(reader.compressed_offset()),
            Backend::Plain { .. } | Backend::Pipe { .. } => None,
        }
    }

    pub(crate) fn inflate_stats(&self) -> Option<InflateStats> {
        match &self.backend {
            Backend::Gzip(reader) => Some(reader.stats()),
            Backend::Plain { .. } | Backend::Pipe { .. } => None,
        }
    }

    pub(crate) fn checkpoint_count(&self) -> usize {
        match &self.backend {
            Backend::Gzip(reader) => reader.checkpoints().len(),
            Backend::Plain { .. } | Backend::Pipe { .. } => 0,
        }
    }

    pub(crate) fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Read into `buf` from logical `offset`
    ///
    /// Pipes only accept the offset they are positioned at.
    pub(crate) fn read_at(&mut self, buf: &mut [u8], offset: u64) -> LineBufferResult<ReadOutcome> {
        let outcome = match &mut self.backend {
            Backend::Plain { file, size } => match read_seekable(&*file, buf, offset)? {
                0 => ReadOutcome::Eof,
                n => {
                    *size = (*size).max(offset + n as u64);
                    ReadOutcome::Data(n)
                }
            },
            Backend::Gzip(reader) => match reader.read_at(buf, offset)? {
                0 => ReadOutcome::Eof,
                n => ReadOutcome::Data(n),
            },
            Backend::Pipe {
                file,
                position,
                closed,
            } => {
                if offset != *position {
                    return Err(LineBufferError::InvalidRange {
                        offset,
                        size: buf.len() as u64,
                        available: *position,
                    });
                }
                if *closed {
                    return Ok(ReadOutcome::Eof);
                }
                match file.read(buf) {
                    Ok(0) => {
                        *closed = true;
                        debug!("Pipe closed after {} bytes", position);
                        ReadOutcome::Eof
                    }
                    Ok(n) => {
                        *position += n as u64;
                        ReadOutcome::Data(n)
                    }
                    Err(e) if is_transient(&e) => ReadOutcome::Pending,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        trace!("read {:?} at offset {}", outcome, offset);
        Ok(outcome)
    }
}
