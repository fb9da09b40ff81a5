//! Command handlers
//!
//! Handlers write to any `io::Write` so they can be driven from tests
//! without spawning the binary.

use anyhow::{Context, Result};
use logview_gzindex::InflateStats;
use logview_linebuf::{CacheStats, FileRange, LineBuffer, LineBufferResult, LineInfo};
use serde::Serialize;
use std::io::Write;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use crate::cli::{Cli, Command, OutputFormat};
use crate::input::attach;

/// Run the parsed command line, writing its output to `out`
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let config = cli.buffer_config();
    match &cli.command {
        Command::Lines(args) => {
            let mut buffer = attach(&args.path, config)?;
            let printed = print_lines(&mut buffer, args.from, args.limit, args.offsets, out)?;
            debug!("Printed {} lines", printed);
        }
        Command::Range(args) => {
            let mut buffer = attach(&args.path, config)?;
            print_range(&mut buffer, FileRange::new(args.offset, args.size), out)?;
        }
        Command::Info(args) => {
            let mut buffer = attach(&args.path, config)?;
            let report = scan(&mut buffer)?;
            write_report(&report, args.format, out)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Frame the line after `prev`, waiting out short reads on open pipes
fn next_line(buffer: &mut LineBuffer, prev: FileRange) -> LineBufferResult<LineInfo> {
    loop {
        let line = buffer.load_next_line(prev)?;
        let waiting = buffer.is_pipe() && !buffer.is_pipe_closed();
        if waiting && (line.partial || line.is_eof()) {
            continue;
        }
        return Ok(line);
    }
}

/// Pipes only move forward: frame lines until the one holding `offset` is cached
fn advance_pipe(buffer: &mut LineBuffer, offset: u64) -> Result<()> {
    if !buffer.is_pipe() || offset == 0 {
        return Ok(());
    }

    let mut prev = FileRange::default();
    loop {
        let line = next_line(buffer, prev)
            .with_context(|| format!("Failed to skip to offset {offset}"))?;
        if line.is_eof() || line.range.next_offset() > offset {
            return Ok(());
        }
        prev = line.range;
    }
}

fn flags(line: &LineInfo) -> &'static str {
    match (line.partial, line.valid_utf) {
        (false, true) => "-",
        (true, true) => "p",
        (false, false) => "b",
        (true, false) => "pb",
    }
}

/// Print up to `limit` lines starting at `from`
///
/// With `offsets`, each line is prefixed with `offset\tsize\tflags\t`, where
/// the flags are `p` for a partial line, `b` for invalid UTF-8, or `-`.
/// Returns the number of lines printed.
pub fn print_lines(
    buffer: &mut LineBuffer,
    from: u64,
    limit: Option<usize>,
    offsets: bool,
    out: &mut impl Write,
) -> Result<usize> {
    advance_pipe(buffer, from)?;
    if buffer.get_file_size().is_some_and(|size| from > size) {
        return Ok(0);
    }

    let mut prev = FileRange::new(from, 0);
    let mut printed = 0;
    while limit.is_none_or(|limit| printed < limit) {
        let line = next_line(buffer, prev)
            .with_context(|| format!("Failed to read line at offset {}", prev.next_offset()))?;
        if line.is_eof() {
            break;
        }

        let view = buffer.read_range(line.range)?;
        if offsets {
            write!(
                out,
                "{}\t{}\t{}\t",
                line.range.offset,
                line.range.size,
                flags(&line)
            )?;
        }
        out.write_all(&view)?;
        if offsets && line.partial {
            writeln!(out)?;
        }

        printed += 1;
        prev = line.range;
    }
    Ok(printed)
}

/// Write the bytes of `range`, in pieces no larger than the buffer ceiling
pub fn print_range(buffer: &mut LineBuffer, range: FileRange, out: &mut impl Write) -> Result<()> {
    advance_pipe(buffer, range.offset)?;

    let chunk = buffer.config().max_capacity as u64;
    let mut offset = range.offset;
    while offset < range.next_offset() {
        let piece = FileRange::new(offset, chunk.min(range.next_offset() - offset));
        let view = buffer
            .read_range(piece)
            .with_context(|| format!("Failed to read range {piece}"))?;
        out.write_all(&view)?;
        offset = piece.next_offset();
    }
    Ok(())
}

/// What a full scan of a source found
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub pipe: bool,
    pub compressed: bool,
    /// Logical size in bytes
    pub size: Option<u64>,
    /// Bytes of compressed input consumed, for gzip sources
    pub compressed_size: Option<u64>,
    /// Modification time in seconds since the Unix epoch
    pub modified: Option<u64>,
    pub lines: u64,
    pub partial_last_line: bool,
    pub invalid_utf_lines: u64,
    pub longest_line: Option<FileRange>,
    pub checkpoints: usize,
    pub inflate: Option<InflateStats>,
    pub cache: CacheStats,
}

/// Frame every line of the source and collect a report
pub fn scan(buffer: &mut LineBuffer) -> Result<SourceReport> {
    let mut report = SourceReport::default();
    let mut longest: Option<FileRange> = None;

    let mut prev = FileRange::default();
    loop {
        let line = next_line(buffer, prev)
            .with_context(|| format!("Failed to read line at offset {}", prev.next_offset()))?;
        if line.is_eof() {
            break;
        }

        report.lines += 1;
        report.partial_last_line = line.partial;
        if !line.valid_utf {
            report.invalid_utf_lines += 1;
        }
        if longest.is_none_or(|longest| line.range.size > longest.size) {
            longest = Some(line.range);
        }
        prev = line.range;
    }

    report.pipe = buffer.is_pipe();
    report.compressed = buffer.is_compressed();
    report.size = buffer.get_file_size();
    report.compressed_size = report
        .compressed
        .then(|| buffer.get_read_offset(prev.next_offset()));
    report.modified = buffer
        .file_time()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs());
    report.longest_line = longest;
    report.checkpoints = buffer.checkpoint_count();
    report.inflate = buffer.inflate_stats();
    report.cache = buffer.cache_stats();

    info!(
        "Scanned {} lines over {} bytes",
        report.lines,
        report.size.unwrap_or_default()
    );
    Ok(report)
}

fn optional(value: Option<u64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Render `report` in the requested format
pub fn write_report(
    report: &SourceReport,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            let kind = match (report.pipe, report.compressed) {
                (true, _) => "pipe",
                (false, true) => "gzip",
                (false, false) => "file",
            };
            writeln!(out, "Source:          {kind}")?;
            writeln!(out, "Size:            {}", optional(report.size))?;
            if report.compressed {
                writeln!(
                    out,
                    "Compressed size: {}",
                    optional(report.compressed_size)
                )?;
            }
            writeln!(out, "Modified:        {}", optional(report.modified))?;
            writeln!(out, "Lines:           {}", report.lines)?;
            writeln!(out, "Partial tail:    {}", report.partial_last_line)?;
            writeln!(out, "Invalid UTF-8:   {}", report.invalid_utf_lines)?;
            if let Some(longest) = report.longest_line {
                writeln!(
                    out,
                    "Longest line:    {} bytes at {}",
                    longest.size, longest.offset
                )?;
            }
            if let Some(stats) = report.inflate {
                writeln!(out, "Checkpoints:     {}", report.checkpoints)?;
                writeln!(out, "Inflated bytes:  {}", stats.bytes_inflated)?;
                writeln!(out, "Resumes:         {}", stats.checkpoint_resumes)?;
            }
            writeln!(out, "Cache fills:     {}", report.cache.fills)?;
        }
    }
    Ok(())
}
