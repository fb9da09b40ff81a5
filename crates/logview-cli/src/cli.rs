//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use logview_gzindex::GzIndexConfig;
use logview_gzindex::config::DEFAULT_CHECKPOINT_SPACING;
use logview_linebuf::LineBufferConfig;
use logview_linebuf::config::{DEFAULT_LINE_BUFFER_SIZE, MAX_LINE_BUFFER_SIZE};
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "linecat",
    about = "Print lines and byte ranges from log files, pipes and gzip files",
    version,
    long_about = "Reads a source through a sliding line buffer. Gzip files are decompressed \
                  with a memoized checkpoint index, so jumping back to earlier offsets does \
                  not inflate the file from the start."
)]
pub struct Cli {
    /// Set the logging level (RUST_LOG takes precedence when set)
    #[arg(short, long, value_enum, global = true, default_value = "warn")]
    pub log_level: LogLevel,

    /// Longest line, in bytes, the buffer will frame
    #[arg(
        long,
        global = true,
        env = "LINECAT_MAX_LINE_SIZE",
        default_value_t = MAX_LINE_BUFFER_SIZE
    )]
    pub max_line_size: usize,

    /// Minimum compressed distance between two gzip checkpoints
    #[arg(
        long,
        global = true,
        env = "LINECAT_CHECKPOINT_SPACING",
        default_value_t = DEFAULT_CHECKPOINT_SPACING
    )]
    pub checkpoint_spacing: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print lines starting at a byte offset
    Lines(LinesArgs),

    /// Print the bytes of an arbitrary range
    Range(RangeArgs),

    /// Scan the whole source and report what was found
    Info(InfoArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct LinesArgs {
    /// File to read, or `-` for standard input
    pub path: PathBuf,

    /// Byte offset of the first line to print
    #[arg(long, default_value_t = 0)]
    pub from: u64,

    /// Stop after this many lines
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Prefix each line with its offset, size and flags
    #[arg(long)]
    pub offsets: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    /// File to read, or `-` for standard input
    pub path: PathBuf,

    /// First byte of the range
    #[arg(long)]
    pub offset: u64,

    /// Number of bytes to print
    #[arg(long)]
    pub size: u64,
}

#[derive(Debug, Clone, clap::Args)]
pub struct InfoArgs {
    /// File to read, or `-` for standard input
    pub path: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
}

impl Cli {
    /// Buffer configuration derived from the global flags
    pub fn buffer_config(&self) -> LineBufferConfig {
        LineBufferConfig::new()
            .with_default_capacity(DEFAULT_LINE_BUFFER_SIZE.min(self.max_line_size))
            .with_max_capacity(self.max_line_size)
            .with_gz(GzIndexConfig::new().with_checkpoint_spacing(self.checkpoint_spacing))
    }
}
