//! Organize command.

use clap::Args;
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::organizer::{PathTemplate, TransferMode};

/// Flags for `organize`; every flag overrides the config file.
#[derive(Args, Debug)]
pub struct OrganizeArgs {
    /// Directory to scan
    pub path: PathBuf,

    /// Library root (defaults to organize.destination)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Copy files, leaving the originals in place
    #[arg(long, conflicts_with = "move_files")]
    pub copy: bool,

    /// Move files into the library
    #[arg(long = "move", conflicts_with = "copy")]
    pub move_files: bool,

    /// Show what would be done without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Template name (series, non_series, single_file, multi_file) or a
    /// template string such as "%author%/%title%"
    #[arg(short, long)]
    pub template: Option<String>,

    /// Lowest score accepted as a match (0.0-1.0)
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Concurrent provider requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write tags from the accepted match into the organized files
    #[arg(long)]
    pub write_tags: bool,
}

impl OrganizeArgs {
    /// Layer the flags over `config`.
    fn apply(&self, config: &mut Config) -> anyhow::Result<PathBuf> {
        if self.dry_run {
            config.organize.mode = TransferMode::DryRun;
        } else if self.copy {
            config.organize.mode = TransferMode::Copy;
        } else if self.move_files {
            config.organize.mode = TransferMode::Move;
        }

        if let Some(min_confidence) = self.min_confidence {
            if !(0.0..=1.0).contains(&min_confidence) {
                anyhow::bail!(
                    "--min-confidence must be between 0.0 and 1.0, got {}",
                    min_confidence
                );
            }
            config.matching.min_confidence = min_confidence;
        }
        if let Some(concurrency) = self.concurrency {
            config.queue.provider_concurrency = concurrency.max(1);
        }
        if self.write_tags {
            config.organize.write_tags = true;
        }

        match self.destination.clone().or_else(|| config.organize.destination.clone()) {
            Some(destination) => Ok(destination),
            None => anyhow::bail!("No destination: pass --destination or set organize.destination"),
        }
    }
}

/// Run the full pipeline and print the tally
pub fn cmd_organize(rt: &Runtime, mut config: Config, args: &OrganizeArgs) -> anyhow::Result<()> {
    let destination = args.apply(&mut config)?;
    let mode = config.organize.mode;
    let template = args.template.as_deref().map(PathTemplate::parse);

    println!("Organizing: {}", args.path.display());
    println!("Destination: {}", destination.display());
    if mode == TransferMode::DryRun {
        println!("\n[DRY RUN MODE - No files will be moved]\n");
    }

    let orchestrator =
        super::build_orchestrator(config, super::console_bus())?.with_template(template);

    rt.block_on(async {
        let batch = orchestrator.run(&args.path, &destination).await?;

        if mode == TransferMode::DryRun {
            for book in &batch.books {
                for (source, target) in book.files.iter().zip(&book.destinations) {
                    println!("WOULD ORGANIZE: {} -> {}", source.display(), target.display());
                }
            }
        }

        println!(
            "\nCompleted {} books: {} processed, {} metadata only, {} failed, {} skipped",
            batch.total(),
            batch.processed, batch.metadata_only, batch.failed, batch.skipped
        );
        if mode == TransferMode::Move && batch.books.iter().any(|b| !b.destinations.is_empty()) {
            println!("Run `audioshelf undo` to revert the moves.");
        }
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(path: &str) -> OrganizeArgs {
        OrganizeArgs {
            path: PathBuf::from(path),
            destination: Some(PathBuf::from("/library")),
            copy: false,
            move_files: false,
            dry_run: false,
            template: None,
            min_confidence: None,
            concurrency: None,
            write_tags: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let flags = OrganizeArgs {
            move_files: true,
            min_confidence: Some(0.9),
            concurrency: Some(0),
            write_tags: true,
            ..args("/in")
        };

        let destination = flags.apply(&mut config).unwrap();

        assert_eq!(destination, PathBuf::from("/library"));
        assert_eq!(config.organize.mode, TransferMode::Move);
        assert_eq!(config.matching.min_confidence, 0.9);
        assert_eq!(config.queue.provider_concurrency, 1);
        assert!(config.organize.write_tags);
    }

    #[test]
    fn test_dry_run_wins() {
        let mut config = Config::default();
        config.organize.mode = TransferMode::Move;
        let flags = OrganizeArgs {
            dry_run: true,
            copy: true,
            ..args("/in")
        };
        flags.apply(&mut config).unwrap();
        assert_eq!(config.organize.mode, TransferMode::DryRun);
    }

    #[test]
    fn test_destination_falls_back_to_config() {
        let mut config = Config::default();
        config.organize.destination = Some(PathBuf::from("/configured"));
        let flags = OrganizeArgs {
            destination: None,
            ..args("/in")
        };
        assert_eq!(flags.apply(&mut config).unwrap(), PathBuf::from("/configured"));
    }

    #[test]
    fn test_missing_destination_is_an_error() {
        let flags = OrganizeArgs {
            destination: None,
            ..args("/in")
        };
        assert!(flags.apply(&mut Config::default()).is_err());
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let flags = OrganizeArgs {
            min_confidence: Some(1.5),
            ..args("/in")
        };
        assert!(flags.apply(&mut Config::default()).is_err());
    }
}
