//! Memoized random access into gzip, zlib and raw deflate streams
//!
//! Deflate data can only be decoded front to back. This crate makes it
//! seekable after the fact: while a stream is inflated forward, the reader
//! records checkpoints at deflate block boundaries. Each checkpoint holds the
//! compressed position (to the bit), the decompressed position, and the
//! 32 KiB dictionary window in force at that point. A later read anywhere
//! behind the current position restarts from the nearest checkpoint instead
//! of from byte zero.
//!
//! # Features
//!
//! - **Lazy indexing**: checkpoints are only captured for regions that were
//!   actually read; nothing is precomputed
//! - **Multi-member gzip**: concatenated members read as one logical stream
//! - **Integrity checks**: CRC-32 and ISIZE verified on linear passes
//! - **Any positioned source**: files, byte vectors, or anything implementing
//!   [`PositionedRead`]
//!
//! # Usage
//!
//! ```rust
//! use flate2::{Compression, write::GzEncoder};
//! use logview_gzindex::{GzIndexConfig, IndexedGzReader};
//! use std::io::Write;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
//! encoder.write_all(b"first line\nsecond line\n")?;
//! let compressed = encoder.finish()?;
//!
//! let mut reader = IndexedGzReader::with_config(compressed, GzIndexConfig::default())?;
//! let mut buf = [0u8; 6];
//! let n = reader.read_at(&mut buf, 11)?;
//! assert_eq!(&buf[..n], b"second");
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod header;
pub mod reader;
pub mod source;
pub mod stats;

pub use checkpoint::{Checkpoint, CheckpointIndex, WINDOW_SIZE};
pub use config::GzIndexConfig;
pub use error::{GzIndexError, GzIndexResult};
pub use header::{ContainerFormat, GZIP_MAGIC, GzipHeader};
pub use reader::{IndexedGzReader, StreamPosition};
pub use source::PositionedRead;
pub use stats::InflateStats;
