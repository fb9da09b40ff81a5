#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Line framing over plain files and pipes

use logview_linebuf::{FileRange, LineBuffer, LineBufferConfig, LineBufferError, LineInfo};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs::File;
use std::io::Write;

fn attach_bytes(contents: &[u8], config: LineBufferConfig) -> LineBuffer {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(contents).unwrap();
    let mut buffer = LineBuffer::new(config).unwrap();
    buffer.attach(file).unwrap();
    buffer
}

/// Feed each line back in until the EOF sentinel
fn collect_lines(buffer: &mut LineBuffer) -> Vec<LineInfo> {
    let mut lines = Vec::new();
    let mut prev = FileRange::default();
    loop {
        let line = buffer.load_next_line(prev).unwrap();
        if line.is_eof() {
            return lines;
        }
        prev = line.range;
        lines.push(line);
        assert!(lines.len() < 100_000, "framing did not terminate");
    }
}

#[cfg(unix)]
fn pipe_with(contents: &[u8]) -> File {
    let (reader, mut writer) = std::io::pipe().unwrap();
    writer.write_all(contents).unwrap();
    drop(writer);
    File::from(std::os::fd::OwnedFd::from(reader))
}

#[test]
fn two_complete_lines_then_eof() {
    let mut buffer = attach_bytes(b"abc\ndef\n", LineBufferConfig::default());

    let first = buffer.load_next_line(FileRange::default()).unwrap();
    assert_eq!(first.range, FileRange::new(0, 4));
    assert!(!first.partial);
    assert_eq!(buffer.read_range(first.range).unwrap().as_slice(), b"abc\n");

    let second = buffer.load_next_line(first.range).unwrap();
    assert_eq!(second.range, FileRange::new(4, 4));
    assert!(!second.partial);
    assert_eq!(buffer.read_range(second.range).unwrap().as_slice(), b"def\n");

    let third = buffer.load_next_line(second.range).unwrap();
    assert_eq!(third.range, FileRange::new(8, 0));
    assert!(!third.partial);
    assert!(third.is_eof());

    assert!(!buffer.is_pipe());
    assert!(!buffer.is_compressed());
    assert_eq!(buffer.get_file_size(), Some(8));
}

#[test]
fn missing_final_newline_is_partial() {
    let mut buffer = attach_bytes(b"one\ntwo", LineBufferConfig::default());
    let lines = collect_lines(&mut buffer);
    assert_eq!(lines.len(), 2);
    assert!(!lines[0].partial);
    assert_eq!(lines[1].range, FileRange::new(4, 3));
    assert!(lines[1].partial);
}

#[test]
fn line_filling_the_ceiling_exactly_is_framed() {
    let config = LineBufferConfig::new()
        .with_default_capacity(256)
        .with_max_capacity(1024)
        .with_growth_increment(128);

    let mut contents = vec![b'a'; 1023];
    contents.push(b'\n');
    contents.extend_from_slice(b"tail\n");
    let mut buffer = attach_bytes(&contents, config);

    let first = buffer.load_next_line(FileRange::default()).unwrap();
    assert_eq!(first.range, FileRange::new(0, 1024));
    assert!(!first.partial);
    let second = buffer.load_next_line(first.range).unwrap();
    assert_eq!(second.range, FileRange::new(1024, 5));
}

#[test]
fn line_one_byte_over_the_ceiling_is_too_long() {
    let config = LineBufferConfig::new()
        .with_default_capacity(256)
        .with_max_capacity(1024)
        .with_growth_increment(128);

    let mut contents = vec![b'a'; 1024];
    contents.push(b'\n');
    let mut buffer = attach_bytes(&contents, config);

    let err = buffer.load_next_line(FileRange::default()).unwrap_err();
    assert!(matches!(
        err,
        LineBufferError::LineTooLong {
            offset: 0,
            limit: 1024
        }
    ));
    assert!(err.is_line_too_long());

    // The engine stays usable after the error
    let view = buffer.read_range(FileRange::new(1020, 5)).unwrap();
    assert_eq!(view.as_slice(), b"aaaa\n");
}

fn small_config() -> LineBufferConfig {
    LineBufferConfig::new()
        .with_default_capacity(32)
        .with_max_capacity(128)
        .with_growth_increment(16)
}

#[test]
fn eof_after_a_line_that_fills_the_ceiling() {
    let mut contents = vec![b'a'; 127];
    contents.push(b'\n');
    let mut buffer = attach_bytes(&contents, small_config());

    let first = buffer.load_next_line(FileRange::default()).unwrap();
    assert_eq!(first.range, FileRange::new(0, 128));

    // The window is full and ends exactly at EOF
    let end = buffer.load_next_line(first.range).unwrap();
    assert!(end.is_eof());
    assert_eq!(end.range, FileRange::new(128, 0));
}

#[test]
fn partial_tail_inside_a_full_window() {
    let mut contents = vec![b'a'; 120];
    contents.push(b'\n');
    contents.extend_from_slice(b"bbbbbbb");
    let mut buffer = attach_bytes(&contents, small_config());

    let lines = collect_lines(&mut buffer);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].range, FileRange::new(0, 121));
    assert_eq!(lines[1].range, FileRange::new(121, 7));
    assert!(lines[1].partial);
    assert_eq!(buffer.read_range(lines[1].range).unwrap().as_slice(), b"bbbbbbb");
}

#[test]
fn mixed_lengths_reach_eof_under_a_small_ceiling() {
    let lengths = [35usize, 43, 35, 40, 10, 36, 38];
    let mut contents = Vec::new();
    for (i, len) in lengths.iter().enumerate() {
        contents.extend(std::iter::repeat_n(b'a' + i as u8, *len));
        contents.push(b'\n');
    }
    let mut buffer = attach_bytes(&contents, small_config());

    let lines = collect_lines(&mut buffer);
    let sizes: Vec<u64> = lines.iter().map(|line| line.range.size).collect();
    let expected: Vec<u64> = lengths.iter().map(|len| *len as u64 + 1).collect();
    assert_eq!(sizes, expected);
    assert!(lines.iter().all(|line| !line.partial));
    assert_eq!(lines.last().unwrap().range.next_offset(), contents.len() as u64);
}

#[test]
fn read_range_is_idempotent_across_eviction() {
    let config = LineBufferConfig::new()
        .with_default_capacity(64)
        .with_max_capacity(128)
        .with_growth_increment(64);
    let contents: Vec<u8> = (0..400)
        .flat_map(|i| format!("line {i:04}\n").into_bytes())
        .collect();
    let mut buffer = attach_bytes(&contents, config);

    let range = FileRange::new(20, 10);
    let before = buffer.read_range(range).unwrap();

    // Walk far enough to evict the first window
    let lines = collect_lines(&mut buffer);
    assert_eq!(lines.len(), 400);
    assert!(!buffer.get_available().contains(20));

    let after = buffer.read_range(range).unwrap();
    assert_eq!(before.as_slice(), after.as_slice());
    assert_eq!(after.as_slice(), &contents[20..30]);
}

#[test]
fn views_outlive_cache_movement() {
    let config = LineBufferConfig::new()
        .with_default_capacity(32)
        .with_max_capacity(64)
        .with_growth_increment(32);
    let contents: Vec<u8> = (0..50)
        .flat_map(|i| format!("entry-{i:02}\n").into_bytes())
        .collect();
    let mut buffer = attach_bytes(&contents, config);

    let first = buffer.load_next_line(FileRange::default()).unwrap();
    let held = buffer.read_range(first.range).unwrap();
    collect_lines(&mut buffer);

    assert_eq!(held.as_slice(), b"entry-00\n");
    assert!(buffer.cache_stats().detached_copies >= 1);

    let bytes = held.into_bytes();
    assert_eq!(&bytes[..], b"entry-00\n");
}

#[test]
fn clear_keeps_source_attached() {
    let mut buffer = attach_bytes(b"abc\ndef\n", LineBufferConfig::default());
    let first = buffer.load_next_line(FileRange::default()).unwrap();
    buffer.clear();
    assert_eq!(buffer.get_available().size, 0);

    let second = buffer.load_next_line(first.range).unwrap();
    assert_eq!(second.range, FileRange::new(4, 4));
}

#[cfg(unix)]
#[test]
fn pipe_without_trailing_newline() {
    let mut buffer = LineBuffer::default();
    buffer.attach(pipe_with(b"xyz")).unwrap();
    assert!(buffer.is_pipe());
    assert!(!buffer.is_pipe_closed());
    assert_eq!(buffer.get_file_size(), None);

    let line = buffer.load_next_line(FileRange::default()).unwrap();
    assert_eq!(line.range, FileRange::new(0, 3));
    assert!(line.partial);

    let end = buffer.load_next_line(line.range).unwrap();
    assert!(end.is_eof());
    assert!(buffer.is_pipe_closed());
    assert_eq!(buffer.get_file_size(), Some(3));
}

#[cfg(unix)]
#[test]
fn pipe_lines_and_rewind_limits() {
    let mut buffer = LineBuffer::default();
    buffer.attach(pipe_with(b"first\nsecond\n")).unwrap();

    let first = buffer.load_next_line(FileRange::default()).unwrap();
    let second = buffer.load_next_line(first.range).unwrap();
    assert_eq!(second.range, FileRange::new(6, 7));

    // Still cached, so re-reading works
    let view = buffer.read_range(first.range).unwrap();
    assert_eq!(view.as_slice(), b"first\n");

    // Past what the pipe produced
    assert!(matches!(
        buffer.read_range(FileRange::new(13, 1)),
        Err(LineBufferError::InvalidRange { .. })
    ));
    assert!(buffer.load_next_line(second.range).unwrap().is_eof());
}

#[cfg(unix)]
#[test]
fn pipe_evicted_data_cannot_be_reread() {
    let config = LineBufferConfig::new()
        .with_default_capacity(32)
        .with_max_capacity(64)
        .with_growth_increment(32);
    let contents: Vec<u8> = (0..40)
        .flat_map(|i| format!("row {i:03}\n").into_bytes())
        .collect();
    let mut buffer = LineBuffer::new(config).unwrap();
    buffer.attach(pipe_with(&contents)).unwrap();

    let mut prev = FileRange::default();
    let mut seen = Vec::new();
    loop {
        let line = buffer.load_next_line(prev).unwrap();
        if line.is_eof() {
            break;
        }
        if line.partial {
            // Short pipe read; ask again from the same place
            continue;
        }
        seen.extend_from_slice(buffer.read_range(line.range).unwrap().as_slice());
        prev = line.range;
    }
    assert!(seen == contents);

    assert!(matches!(
        buffer.read_range(FileRange::new(0, 8)),
        Err(LineBufferError::InvalidRange { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Feeding ranges back in reconstructs every delimiter position
    #[test]
    fn framing_reconstructs_lines(
        lines in prop::collection::vec(prop::collection::vec(b'a'..=b'z', 0..90), 0..60),
        trailing_newline in any::<bool>()
    ) {
        let mut contents = lines.join(&b'\n');
        if trailing_newline && !contents.is_empty() {
            contents.push(b'\n');
        }

        let config = LineBufferConfig::new()
            .with_default_capacity(32)
            .with_max_capacity(128)
            .with_growth_increment(16);
        let mut buffer = attach_bytes(&contents, config);
        let framed = collect_lines(&mut buffer);

        let mut expected = Vec::new();
        let mut start = 0u64;
        for (i, byte) in contents.iter().enumerate() {
            if *byte == b'\n' {
                expected.push(FileRange::new(start, i as u64 + 1 - start));
                start = i as u64 + 1;
            }
        }
        if start < contents.len() as u64 {
            expected.push(FileRange::new(start, contents.len() as u64 - start));
        }

        let ranges: Vec<FileRange> = framed.iter().map(|line| line.range).collect();
        prop_assert_eq!(ranges, expected);

        let ends_open = !contents.is_empty() && contents.last() != Some(&b'\n');
        for (i, line) in framed.iter().enumerate() {
            prop_assert_eq!(line.partial, ends_open && i + 1 == framed.len());
            prop_assert!(line.valid_utf);
        }
    }
}
