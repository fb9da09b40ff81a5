//! Library side of the `linecat` binary
//!
//! Argument definitions live in [`cli`], source opening in [`input`] and
//! the command handlers in [`commands`].

pub mod cli;
pub mod commands;
pub mod input;

pub use cli::{Cli, Command, OutputFormat};
pub use commands::{SourceReport, run};
