//! Undo command.

use std::path::Path;

use crate::config::Config;
use crate::organizer;

/// Move every file of the last organize run back where it came from
pub fn cmd_undo(config: &Config, journal: Option<&Path>) -> anyhow::Result<()> {
    let path = journal
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.organize.journal_path());

    if !path.exists() {
        println!("Nothing to undo ({} not found).", path.display());
        return Ok(());
    }

    let summary = organizer::undo(&path)?;
    println!("Restored {} files.", summary.restored);
    if summary.failed > 0 {
        anyhow::bail!(
            "{} files could not be restored; they remain in {}",
            summary.failed,
            path.display()
        );
    }
    Ok(())
}
