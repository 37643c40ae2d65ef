//! CLI layer for pskit.
//!
//! Provides the command-line interface using clap, with one command per
//! batch computation.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
