//! audioshelf - an audiobook library organizer.
//!
//! Scans a directory of loose audio files, groups them into books, identifies
//! each book against the Audible catalog and moves (or copies) it into a
//! clean `Author/Series/Title` library layout.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod library;
pub mod matching;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod organizer;
pub mod provider;
pub mod queue;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let default_directive: Directive = "audioshelf=info".parse()?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(default_directive))
        .init();

    if !cli::run_command(&args)? {
        cli::Cli::command().print_help()?;
    }
    Ok(())
}
