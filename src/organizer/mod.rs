//! File organization and movement utilities.
//!
//! Moves (or copies) audiobook files into the layout produced by
//! [`template::PathTemplateEngine`].
//!
//! # Features
//! - Move, copy and dry-run transfer modes
//! - Never overwrites an existing destination
//! - Undo support with a journal of performed moves
//! - Automatic cleanup of emptied directories on undo

pub mod template;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub use template::{PathOptions, PathTemplate, PathTemplateEngine, TemplateSet, sanitize_path};

/// Organization failures.
#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error("Path exceeds {max} characters even after truncation: {}", path.display())]
    PathTooLong { path: PathBuf, max: usize },

    #[error("Template '{template}' produced an empty path")]
    EmptyPath { template: String },

    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Undo journal error: {0}")]
    Journal(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> OrganizeError + '_ {
    move |source| OrganizeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// How files reach their destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Move,
    Copy,
    #[default]
    DryRun,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Moved,
    Copied,
    /// Dry run: would have been transferred
    Planned,
    /// Already at its destination
    Skipped,
}

/// Transfer `source` to `destination`, creating parent directories.
///
/// An existing destination is never overwritten, even in dry-run mode.
pub fn transfer_file(
    source: &Path,
    destination: &Path,
    mode: TransferMode,
) -> Result<TransferOutcome, OrganizeError> {
    if source == destination || same_file(source, destination) {
        return Ok(TransferOutcome::Skipped);
    }

    if destination.exists() {
        return Err(OrganizeError::DestinationExists(destination.to_path_buf()));
    }

    if mode == TransferMode::DryRun {
        return Ok(TransferOutcome::Planned);
    }

    // Create parent directories
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    match mode {
        TransferMode::Move => {
            move_file(source, destination)?;
            Ok(TransferOutcome::Moved)
        }
        TransferMode::Copy => {
            copy_file(source, destination)?;
            Ok(TransferOutcome::Copied)
        }
        TransferMode::DryRun => Ok(TransferOutcome::Planned),
    }
}

/// Fail on the first target that is already taken by another file.
pub fn check_destinations(sources: &[PathBuf], targets: &[PathBuf]) -> Result<(), OrganizeError> {
    for (source, target) in sources.iter().zip(targets) {
        if target.exists() && source != target && !same_file(source, target) {
            return Err(OrganizeError::DestinationExists(target.clone()));
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn exists_or_io(path: &Path) -> impl FnOnce(io::Error) -> OrganizeError + '_ {
    move |source| match source.kind() {
        io::ErrorKind::AlreadyExists => OrganizeError::DestinationExists(path.to_path_buf()),
        _ => OrganizeError::Io {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Copy into a freshly created `destination`; fails if it already exists.
fn copy_file(source: &Path, destination: &Path) -> Result<(), OrganizeError> {
    let mut reader = File::open(source).map_err(io_error(source))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(exists_or_io(destination))?;

    if let Err(e) = io::copy(&mut reader, &mut writer) {
        drop(writer);
        let _ = fs::remove_file(destination);
        return Err(io_error(destination)(e));
    }
    Ok(())
}

/// Hard link then unlink, falling back to copy + delete across devices.
///
/// Neither path replaces an existing `destination`.
fn move_file(source: &Path, destination: &Path) -> Result<(), OrganizeError> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(OrganizeError::DestinationExists(destination.to_path_buf()));
        }
        Err(_) => copy_file(source, destination)?,
    }
    fs::remove_file(source).map_err(io_error(source))
}

/// A record of a file move operation, used for undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub book: String,
}

/// Journal of the last organize run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoJournal {
    pub moves: Vec<MoveRecord>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl UndoJournal {
    const FILE_NAME: &'static str = "undo.json";

    /// `<data dir>/audioshelf/undo.json`, or the working directory when the
    /// platform has no data dir.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("audioshelf").join(Self::FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(Self::FILE_NAME))
    }

    pub fn record(&mut self, source: &Path, destination: &Path, book: &str) {
        self.moves.push(MoveRecord {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            book: book.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Load a journal; `Ok(None)` when there is nothing to undo.
    pub fn load(path: &Path) -> Result<Option<Self>, OrganizeError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path).map_err(io_error(path))?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| OrganizeError::Journal(e.to_string()))
    }

    /// Save atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), OrganizeError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut journal = self.clone();
        journal.timestamp.get_or_insert_with(Utc::now);
        let json = serde_json::to_string_pretty(&journal)
            .map_err(|e| OrganizeError::Journal(e.to_string()))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(io_error(&temp_path))?;
        fs::rename(&temp_path, path).map_err(io_error(path))?;
        Ok(())
    }

    pub fn clear(path: &Path) -> Result<(), OrganizeError> {
        if path.exists() {
            fs::remove_file(path).map_err(io_error(path))?;
        }
        Ok(())
    }
}

/// Moves a single file back to its original location.
pub fn undo_move(record: &MoveRecord) -> Result<(), OrganizeError> {
    if record.source.exists() {
        return Err(OrganizeError::DestinationExists(record.source.clone()));
    }

    // Create parent directories for the original location
    if let Some(parent) = record.source.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    move_file(&record.destination, &record.source)?;

    // Try to clean up empty directories
    if let Some(parent) = record.destination.parent() {
        let _ = remove_empty_dirs(parent);
    }

    Ok(())
}

/// Result of replaying a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoSummary {
    pub restored: usize,
    pub failed: usize,
}

/// Revert the journal at `path`, newest move first.
///
/// The journal is removed when every move was reverted and kept (with only
/// the failed entries) otherwise.
pub fn undo(path: &Path) -> Result<UndoSummary, OrganizeError> {
    let Some(journal) = UndoJournal::load(path)? else {
        return Ok(UndoSummary::default());
    };

    let mut summary = UndoSummary::default();
    let mut remaining = Vec::new();
    for record in journal.moves.iter().rev() {
        match undo_move(record) {
            Ok(()) => summary.restored += 1,
            Err(e) => {
                tracing::warn!(
                    target: "organizer::undo",
                    source = %record.source.display(),
                    error = %e,
                    "Failed to restore file"
                );
                summary.failed += 1;
                remaining.push(record.clone());
            }
        }
    }

    if remaining.is_empty() {
        UndoJournal::clear(path)?;
    } else {
        remaining.reverse();
        UndoJournal {
            moves: remaining,
            timestamp: journal.timestamp,
        }
        .save(path)?;
    }

    tracing::info!(
        target: "organizer::undo",
        restored = summary.restored,
        failed = summary.failed,
        "Undo finished"
    );
    Ok(summary)
}

/// Recursively removes empty directories up the tree
fn remove_empty_dirs(path: &Path) -> io::Result<()> {
    if path.is_dir() && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        if let Some(parent) = path.parent() {
            let _ = remove_empty_dirs(parent);
        }
    }
    Ok(())
}
