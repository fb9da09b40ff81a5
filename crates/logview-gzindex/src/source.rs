//! Positioned reads over compressed input

use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

/// A byte source that can be read at arbitrary offsets without moving a
/// shared cursor.
///
/// Implementations must be safe to call with any offset; reading at or past
/// the end returns `Ok(0)`.
pub trait PositionedRead {
    /// Read up to `buf.len()` bytes starting at `offset`
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fill as much of `buf` as the source allows, stopping early only at EOF
    fn read_full_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl PositionedRead for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl PositionedRead for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl PositionedRead for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl<T: PositionedRead + ?Sized> PositionedRead for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<T: PositionedRead + ?Sized> PositionedRead for Arc<T> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// Sequential [`Read`] adapter over a [`PositionedRead`] source
///
/// Used for header parsing, where `byteorder` helpers want a cursor.
pub(crate) struct PositionedCursor<'a, R: ?Sized> {
    source: &'a R,
    position: u64,
}

impl<'a, R: PositionedRead + ?Sized> PositionedCursor<'a, R> {
    pub(crate) fn new(source: &'a R, position: u64) -> Self {
        Self { source, position }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }
}

impl<R: PositionedRead + ?Sized> Read for PositionedCursor<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_read_at() {
        let data = b"hello world".to_vec();
        let mut buf = [0u8; 5];

        assert_eq!(data.read_at(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(data.read_at(&mut buf, 9).unwrap(), 2);
        assert_eq!(&buf[..2], b"ld");
        assert_eq!(data.read_at(&mut buf, 11).unwrap(), 0);
        assert_eq!(data.read_at(&mut buf, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_file_read_full_at() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut buf = [0u8; 16];
        let n = file.read_full_at(&mut buf, 3).unwrap();
        assert_eq!(&buf[..n], b"3456789");
    }

    #[test]
    fn test_cursor_advances() {
        let data = b"abcdef".to_vec();
        let mut cursor = PositionedCursor::new(&data, 2);
        let mut buf = [0u8; 2];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cd");
        assert_eq!(cursor.position(), 4);
    }
}
