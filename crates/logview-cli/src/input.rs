//! Opening the source named on the command line

use anyhow::{Context, Result};
use logview_linebuf::{LineBuffer, LineBufferConfig};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Open `path`, where `-` means standard input
pub fn open_source(path: &Path) -> Result<File> {
    if path.as_os_str() == "-" {
        return stdin_file();
    }
    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

#[cfg(unix)]
fn stdin_file() -> Result<File> {
    use std::os::fd::AsFd;

    let fd = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("Failed to duplicate standard input")?;
    Ok(File::from(fd))
}

#[cfg(not(unix))]
fn stdin_file() -> Result<File> {
    anyhow::bail!("Reading from standard input is only supported on unix")
}

/// Build a line buffer and attach the source at `path` to it
pub fn attach(path: &Path, config: LineBufferConfig) -> Result<LineBuffer> {
    let mut buffer = LineBuffer::new(config).context("Invalid buffer configuration")?;
    let file = open_source(path)?;
    buffer
        .attach(file)
        .with_context(|| format!("Failed to attach {}", path.display()))?;

    debug!(
        "Attached {} (pipe: {}, compressed: {})",
        path.display(),
        buffer.is_pipe(),
        buffer.is_compressed()
    );
    Ok(buffer)
}
