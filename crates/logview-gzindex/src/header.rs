//! Container header detection and parsing
//!
//! The index only ever inflates raw deflate data. This module locates where
//! that data begins inside a gzip (RFC 1952) or zlib (RFC 1950) container.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

use crate::error::{GzIndexError, GzIndexResult};
use crate::source::{PositionedCursor, PositionedRead};

/// Gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Deflate compression method identifier shared by gzip and zlib
const METHOD_DEFLATE: u8 = 8;

const FLAG_TEXT: u8 = 0x01;
const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xe0;

/// Zero-terminated header strings longer than this are rejected
const MAX_HEADER_STRING: usize = 64 * 1024;

/// Framing around the raw deflate stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// RFC 1952 gzip members
    Gzip,
    /// RFC 1950 zlib stream
    Zlib,
    /// Headerless deflate
    Raw,
}

impl ContainerFormat {
    /// Size of the trailer that follows the deflate stream
    pub const fn trailer_len(self) -> u64 {
        match self {
            Self::Gzip => 8,
            Self::Zlib => 4,
            Self::Raw => 0,
        }
    }

    /// Guess the container from its leading bytes
    ///
    /// Anything that is neither gzip nor a valid zlib header is reported as
    /// [`ContainerFormat::Raw`].
    pub fn sniff(prefix: &[u8]) -> Self {
        if prefix.starts_with(&GZIP_MAGIC) {
            return Self::Gzip;
        }
        if let [cmf, flg, ..] = *prefix
            && cmf & 0x0f == METHOD_DEFLATE
            && cmf >> 4 <= 7
            && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
        {
            return Self::Zlib;
        }
        Self::Raw
    }

    /// Read the leading bytes of `source` and guess its container
    pub fn detect<R: PositionedRead + ?Sized>(source: &R) -> io::Result<Self> {
        let mut prefix = [0u8; 2];
        let n = source.read_full_at(&mut prefix, 0)?;
        Ok(Self::sniff(&prefix[..n]))
    }
}

/// Parsed gzip member header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    /// Raw MTIME field, seconds since the epoch (0 when unset)
    pub mtime: u32,
    /// Operating system identifier
    pub os: u8,
    /// Extra flags (compression level hint)
    pub extra_flags: u8,
    /// Whether the producer marked the content as text
    pub is_text: bool,
    /// Original file name, if recorded
    pub name: Option<String>,
    /// Free-form comment, if recorded
    pub comment: Option<String>,
    /// Number of bytes from the member start to the deflate data
    pub header_len: u64,
}

impl GzipHeader {
    /// Parse a gzip member header starting at `offset`
    pub fn parse<R: PositionedRead + ?Sized>(source: &R, offset: u64) -> GzIndexResult<Self> {
        let mut cursor = PositionedCursor::new(source, offset);
        let header = Self::read_from(&mut cursor, offset).map_err(|e| match e {
            GzIndexError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                GzIndexError::InvalidHeader(format!("truncated gzip header at offset {offset}"))
            }
            other => other,
        })?;

        trace!(
            "gzip member at {}: header_len={}, mtime={}, name={:?}",
            offset, header.header_len, header.mtime, header.name
        );
        Ok(header)
    }

    fn read_from<R: PositionedRead + ?Sized>(
        cursor: &mut PositionedCursor<'_, R>,
        offset: u64,
    ) -> GzIndexResult<Self> {
        let mut magic = [0u8; 2];
        cursor.read_exact(&mut magic)?;
        if magic != GZIP_MAGIC {
            return Err(GzIndexError::InvalidHeader(format!(
                "expected gzip magic 1f 8b, got {:02x} {:02x}",
                magic[0], magic[1]
            )));
        }

        let method = cursor.read_u8()?;
        if method != METHOD_DEFLATE {
            return Err(GzIndexError::UnsupportedFormat(format!(
                "gzip compression method {method}"
            )));
        }

        let flags = cursor.read_u8()?;
        if flags & FLAG_RESERVED != 0 {
            return Err(GzIndexError::InvalidHeader(format!(
                "reserved gzip flags set: {flags:#04x}"
            )));
        }

        let mtime = cursor.read_u32::<LittleEndian>()?;
        let extra_flags = cursor.read_u8()?;
        let os = cursor.read_u8()?;

        if flags & FLAG_EXTRA != 0 {
            let xlen = u64::from(cursor.read_u16::<LittleEndian>()?);
            let skipped = io::copy(&mut cursor.by_ref().take(xlen), &mut io::sink())?;
            if skipped != xlen {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
        }

        let name = if flags & FLAG_NAME != 0 {
            Some(read_zero_terminated(cursor)?)
        } else {
            None
        };
        let comment = if flags & FLAG_COMMENT != 0 {
            Some(read_zero_terminated(cursor)?)
        } else {
            None
        };

        if flags & FLAG_HCRC != 0 {
            cursor.read_u16::<LittleEndian>()?;
        }

        Ok(Self {
            mtime,
            os,
            extra_flags,
            is_text: flags & FLAG_TEXT != 0,
            name,
            comment,
            header_len: cursor.position() - offset,
        })
    }

    /// MTIME as a timestamp, `None` when the producer left it at zero
    pub fn modified(&self) -> Option<SystemTime> {
        if self.mtime == 0 {
            return None;
        }
        UNIX_EPOCH.checked_add(Duration::from_secs(u64::from(self.mtime)))
    }
}

/// Validate a zlib header at `offset` and return its length
pub fn parse_zlib_header<R: PositionedRead + ?Sized>(
    source: &R,
    offset: u64,
) -> GzIndexResult<u64> {
    let mut header = [0u8; 2];
    if source.read_full_at(&mut header, offset)? < header.len() {
        return Err(GzIndexError::InvalidHeader(
            "truncated zlib header".to_string(),
        ));
    }
    if ContainerFormat::sniff(&header) != ContainerFormat::Zlib {
        return Err(GzIndexError::InvalidHeader(format!(
            "invalid zlib header {:02x} {:02x}",
            header[0], header[1]
        )));
    }
    if header[1] & 0x20 != 0 {
        return Err(GzIndexError::UnsupportedFormat(
            "zlib preset dictionary".to_string(),
        ));
    }
    Ok(2)
}

fn read_zero_terminated<R: Read>(reader: &mut R) -> GzIndexResult<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        }
        if bytes.len() >= MAX_HEADER_STRING {
            return Err(GzIndexError::InvalidHeader(
                "unterminated gzip header string".to_string(),
            ));
        }
        bytes.push(byte);
    }
    // Latin-1 per RFC 1952, decoded lossily
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn header_with(flags: u8, tail: &[u8]) -> Vec<u8> {
        let mut data = vec![0x1f, 0x8b, 8, flags];
        data.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        data.extend_from_slice(&[0, 3]);
        data.extend_from_slice(tail);
        data
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ContainerFormat::sniff(&[0x1f, 0x8b, 8]), ContainerFormat::Gzip);
        assert_eq!(ContainerFormat::sniff(&[0x78, 0x9c]), ContainerFormat::Zlib);
        assert_eq!(ContainerFormat::sniff(&[0x78, 0x01]), ContainerFormat::Zlib);
        assert_eq!(ContainerFormat::sniff(b"plain text"), ContainerFormat::Raw);
        assert_eq!(ContainerFormat::sniff(&[]), ContainerFormat::Raw);
    }

    #[test]
    fn test_minimal_header() {
        let data = header_with(0, &[0xaa]);
        let header = GzipHeader::parse(&data, 0).unwrap();
        assert_eq!(header.header_len, 10);
        assert_eq!(header.mtime, 1_700_000_000);
        assert_eq!(header.os, 3);
        assert!(header.name.is_none());
        assert!(header.modified().is_some());
    }

    #[test]
    fn test_optional_fields() {
        let mut tail = Vec::new();
        tail.extend_from_slice(&3u16.to_le_bytes());
        tail.extend_from_slice(b"xyz");
        tail.extend_from_slice(b"access.log\0");
        tail.extend_from_slice(b"rotated\0");
        tail.extend_from_slice(&[0x12, 0x34]);
        let data = header_with(FLAG_EXTRA | FLAG_NAME | FLAG_COMMENT | FLAG_HCRC, &tail);

        let header = GzipHeader::parse(&data, 0).unwrap();
        assert_eq!(header.name.as_deref(), Some("access.log"));
        assert_eq!(header.comment.as_deref(), Some("rotated"));
        assert_eq!(header.header_len, 10 + 5 + 11 + 8 + 2);
    }

    #[test]
    fn test_parse_at_offset() {
        let mut data = b"prefix".to_vec();
        data.extend_from_slice(&header_with(FLAG_NAME, b"a\0"));
        let header = GzipHeader::parse(&data, 6).unwrap();
        assert_eq!(header.header_len, 12);
    }

    #[test]
    fn test_truncated_header() {
        let data = header_with(FLAG_NAME, b"unterminated");
        assert!(matches!(
            GzipHeader::parse(&data, 0),
            Err(GzIndexError::InvalidHeader(_))
        ));
        assert!(matches!(
            GzipHeader::parse(&data[..5].to_vec(), 0),
            Err(GzIndexError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_bad_method_and_flags() {
        let mut data = header_with(0, &[]);
        data[2] = 7;
        assert!(matches!(
            GzipHeader::parse(&data, 0),
            Err(GzIndexError::UnsupportedFormat(_))
        ));

        let data = header_with(0x80, &[]);
        assert!(matches!(
            GzipHeader::parse(&data, 0),
            Err(GzIndexError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_zlib_header() {
        assert_eq!(parse_zlib_header(&vec![0x78, 0x9c], 0).unwrap(), 2);
        assert!(parse_zlib_header(&vec![0x78, 0xbb], 0).is_err());
        assert!(parse_zlib_header(&vec![0x78], 0).is_err());
    }
}
