//! Command-line interface for audioshelf.
//!
//! Scanning, identifying, organizing and undoing are all driven from here;
//! there is no other front end.

mod commands;

pub use commands::{Cli, Commands, run_command};
