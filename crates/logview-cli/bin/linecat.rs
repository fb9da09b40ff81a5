//! Print lines and byte ranges from log files, pipes and gzip files

use clap::Parser;
use logview_cli::{Cli, run};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(Level::from(cli.log_level)).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    run(&cli, &mut stdout.lock())
}
