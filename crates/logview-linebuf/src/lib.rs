//! Line-oriented random access over files, pipes and gzip files
//!
//! [`LineBuffer`] answers "give me the line that starts at byte offset X"
//! without loading the whole source. It keeps one sliding window of the
//! source in a [`ByteCache`], scans it for the delimiter, and hands out
//! [`LineInfo`] descriptors. Byte ranges are resolved into shared
//! [`BufferView`]s that stay valid while the cache moves on.
//!
//! Regular files are read with positioned reads. Gzip files go through
//! [`logview_gzindex::IndexedGzReader`], which memoizes decompression
//! checkpoints so re-reading earlier lines does not inflate the file from
//! the start. Pipes are read sequentially and cannot be rewound behind the
//! cached window.
//!
//! # Usage
//!
//! ```rust
//! use logview_linebuf::{FileRange, LineBuffer};
//! use std::io::Write;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = tempfile::tempfile()?;
//! file.write_all(b"abc\ndef\n")?;
//!
//! let mut buffer = LineBuffer::default();
//! buffer.attach(file)?;
//!
//! let mut prev = FileRange::default();
//! loop {
//!     let line = buffer.load_next_line(prev)?;
//!     if line.is_eof() {
//!         break;
//!     }
//!     let view = buffer.read_range(line.range)?;
//!     print!("{}", String::from_utf8_lossy(&view));
//!     prev = line.range;
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod range;
mod source;
pub mod view;

pub use buffer::LineBuffer;
pub use cache::{ByteCache, CacheStats};
pub use config::LineBufferConfig;
pub use error::{LineBufferError, LineBufferResult};
pub use range::{FileRange, LineInfo};
pub use view::BufferView;
