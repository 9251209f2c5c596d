//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `scan`: scan and group without touching the network
//! - `identify`: ranked provider candidates per book
//! - `organize`: the full batch pipeline
//! - `undo`: revert the last organize run
//! - `config`: show or initialize the configuration file

mod config;
mod identify;
mod organize;
mod scan;
mod undo;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::events::{Event, EventBus, EventKind, SubscribeOptions};
use crate::metadata::LoftyTagCodec;
use crate::orchestrator::Orchestrator;
use crate::provider::AudibleProvider;

pub use config::cmd_config;
pub use identify::cmd_identify;
pub use organize::{OrganizeArgs, cmd_organize};
pub use scan::cmd_scan;
pub use undo::cmd_undo;

/// Audiobook library organizer
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the OS config directory)
    #[arg(long, global = true, env = "AUDIOSHELF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory and list the books found
    Scan {
        /// Directory to scan
        path: PathBuf,
    },
    /// Look up every book and show the best candidates
    Identify {
        /// Directory to scan
        path: PathBuf,
        /// Candidates shown per book
        #[arg(short, long, default_value = "3")]
        top: usize,
    },
    /// Identify books and organize them into a library
    Organize(OrganizeArgs),
    /// Revert the moves of the last organize run
    Undo {
        /// Undo journal (defaults to the configured journal)
        #[arg(long)]
        journal: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
///
/// Returns `Ok(true)` if a command was run, `Ok(false)` if no command was
/// specified (the caller prints usage).
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let config = load_config(cli.config.as_deref())?;

    match command {
        Commands::Scan { path } => cmd_scan(&rt, &config, path)?,
        Commands::Identify { path, top } => cmd_identify(&rt, &config, path, *top)?,
        Commands::Organize(args) => cmd_organize(&rt, config, args)?,
        Commands::Undo { journal } => cmd_undo(&config, journal.as_deref())?,
        Commands::Config { init } => cmd_config(&config, cli.config.as_deref(), *init)?,
    }
    Ok(true)
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// An explicit file must parse; the default location falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) if path.exists() => Ok(crate::config::load_from(path)?),
        Some(path) => {
            tracing::warn!(target: "cli", path = %path.display(), "Config file not found, using defaults");
            Ok(Config::default())
        }
        None => Ok(crate::config::load()),
    }
}

/// Event bus that echoes scan progress and per-book results to the terminal.
pub(crate) fn console_bus() -> Arc<EventBus> {
    let bus = Arc::new(EventBus::new());

    bus.subscribe(
        EventKind::ScanProgress,
        |event| {
            if let Event::ScanProgress { files_found, .. } = event {
                eprint!("\rScanned {} files...", files_found);
            }
            Ok(())
        },
        SubscribeOptions::default(),
    );
    bus.subscribe(
        EventKind::ScanCompleted,
        |event| {
            if let Event::ScanCompleted {
                files_found,
                skipped_dirs,
                elapsed_ms,
                ..
            } = event
            {
                eprintln!(
                    "\rScan complete: {} files in {} ms ({} unreadable directories)",
                    files_found, elapsed_ms, skipped_dirs
                );
            }
            Ok(())
        },
        SubscribeOptions::default(),
    );
    bus.subscribe(
        EventKind::BookCompleted,
        |event| {
            if let Event::BookCompleted { book, status, error } = event {
                match error {
                    Some(error) => println!("[{}] {}: {}", status, book, error),
                    None => println!("[{}] {}", status, book),
                }
            }
            Ok(())
        },
        SubscribeOptions::default(),
    );
    bus
}

/// Orchestrator wired to the Audible provider, the lofty tag codec and `bus`.
pub(crate) fn build_orchestrator(
    config: Config,
    bus: Arc<EventBus>,
) -> anyhow::Result<Orchestrator> {
    let provider = AudibleProvider::new(&config.provider, config.matching.search_limit)?;
    Ok(Orchestrator::new(config, Arc::new(provider), bus).with_tag_codec(Arc::new(LoftyTagCodec)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_organize_flags() {
        let cli = Cli::try_parse_from([
            "audioshelf",
            "organize",
            "/incoming",
            "--destination",
            "/library",
            "--copy",
            "--template",
            "series",
            "--min-confidence",
            "0.8",
            "--concurrency",
            "5",
            "--write-tags",
        ])
        .unwrap();

        let Some(Commands::Organize(args)) = cli.command else {
            panic!("expected organize");
        };
        assert_eq!(args.path, PathBuf::from("/incoming"));
        assert_eq!(args.destination, Some(PathBuf::from("/library")));
        assert!(args.copy);
        assert!(!args.move_files);
        assert_eq!(args.template.as_deref(), Some("series"));
        assert_eq!(args.min_confidence, Some(0.8));
        assert_eq!(args.concurrency, Some(5));
        assert!(args.write_tags);
    }

    #[test]
    fn test_copy_and_move_conflict() {
        let result = Cli::try_parse_from(["audioshelf", "organize", "/in", "--copy", "--move"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_command_runs_nothing() {
        let cli = Cli::try_parse_from(["audioshelf"]).unwrap();
        assert!(!run_command(&cli).unwrap());
    }

    #[test]
    fn test_load_config_missing_explicit_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_config(Some(temp.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[queue]\nmax_retries = \"many\"\n").unwrap();
        assert!(load_config(Some(path.as_path())).is_err());
    }
}
