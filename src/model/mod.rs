//! Core data models for the audiobook pipeline.
//!
//! Defines the entities that flow between the pipeline stages:
//! - [`FileEntry`] - an immutable snapshot of one scanned file
//! - [`BookGroup`] - one or more files believed to form a single book
//! - [`InferredIdentity`] - what we think a book is, from filenames or tags
//! - [`MetadataCandidate`] - a provider record that might describe the book
//! - [`MatchResult`] - a candidate paired with its confidence score
//! - [`BatchResult`] - the tally reported upward after a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A scanned audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Full path to the file
    pub path: PathBuf,
    /// File name including extension
    pub name: String,
    /// Directory containing the file
    pub directory: PathBuf,
    /// Lower-cased extension without the dot
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Creation time, when the filesystem reports one
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// Base name of the containing directory.
    pub fn directory_name(&self) -> &str {
        self.directory
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// One logical audiobook assembled from one or more files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookGroup {
    /// Directory-scoped, lower-cased identity key
    pub key: String,
    /// Display name (cleaned stem of the first file)
    pub name: String,
    /// Directory of the first file
    pub directory: PathBuf,
    /// Files in playback order; never empty
    pub files: Vec<FileEntry>,
    /// Sum of all file sizes
    pub total_size: u64,
}

impl BookGroup {
    /// Start a group from its first file.
    pub fn new(key: String, name: String, first: FileEntry) -> Self {
        Self {
            key,
            name,
            directory: first.directory.clone(),
            total_size: first.size,
            files: vec![first],
        }
    }

    /// Append a file sharing this group's key.
    pub fn push(&mut self, file: FileEntry) {
        self.total_size += file.size;
        self.files.push(file);
    }

    pub fn is_multi_file(&self) -> bool {
        self.files.len() > 1
    }
}

/// Series membership: a name and an optional position label.
///
/// Positions are kept as text since providers use labels like "1.5" or "Book One".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub name: String,
    pub position: Option<String>,
}

impl SeriesInfo {
    pub fn new(name: impl Into<String>, position: Option<&str>) -> Self {
        Self {
            name: name.into(),
            position: position.map(str::to_string),
        }
    }
}

/// What we believe a book is before asking a provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InferredIdentity {
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub series: Option<SeriesInfo>,
    /// Catalog identifier found in a tag or filename
    pub asin: Option<String>,
}

impl InferredIdentity {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// True when nothing usable for a lookup is known.
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.asin.is_none()
    }

    /// Fill missing fields from `other`, keeping what is already set.
    pub fn merge(&mut self, other: &InferredIdentity) {
        if self.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if self.author.is_none() {
            self.author = other.author.clone();
        }
        if self.narrator.is_none() {
            self.narrator = other.narrator.clone();
        }
        if self.series.is_none() {
            self.series = other.series.clone();
        }
        if self.asin.is_none() {
            self.asin = other.asin.clone();
        }
    }
}

/// A named contributor (author or narrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
}

impl Contributor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A metadata record supplied by a provider.
///
/// Populated by the provider adapter; nothing past that boundary sees raw
/// provider payloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataCandidate {
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<Contributor>,
    pub narrators: Vec<Contributor>,
    pub series: Option<SeriesInfo>,
    pub asin: Option<String>,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
    pub release_year: Option<i32>,
}

impl MetadataCandidate {
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }

    pub fn primary_narrator(&self) -> Option<&str> {
        self.narrators.first().map(|n| n.name.as_str())
    }

    /// Build a candidate from locally inferred data, used when no provider
    /// record was accepted.
    pub fn from_identity(identity: &InferredIdentity) -> Self {
        Self {
            title: identity.title.clone(),
            authors: identity
                .author
                .iter()
                .map(|a| Contributor::new(a.as_str()))
                .collect(),
            narrators: identity
                .narrator
                .iter()
                .map(|n| Contributor::new(n.as_str()))
                .collect(),
            series: identity.series.clone(),
            asin: identity.asin.clone(),
            ..Default::default()
        }
    }
}

/// A candidate with its confidence score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: MetadataCandidate,
    pub score: f64,
}

/// Terminal status of one book in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Processed,
    MetadataOnly,
    Skipped,
    Failed,
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookStatus::Processed => "processed",
            BookStatus::MetadataOnly => "metadata_only",
            BookStatus::Skipped => "skipped",
            BookStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-book entry of a [`BatchResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutcome {
    pub name: String,
    pub files: Vec<PathBuf>,
    pub status: BookStatus,
    pub metadata: Option<MetadataCandidate>,
    pub score: Option<f64>,
    /// Target paths, in the same order as `files` (empty when not organized).
    /// A failed book lists only the files that did reach the library.
    pub destinations: Vec<PathBuf>,
    pub error: Option<String>,
}

impl BookOutcome {
    pub fn new(group: &BookGroup, status: BookStatus) -> Self {
        Self {
            name: group.name.clone(),
            files: group.files.iter().map(|f| f.path.clone()).collect(),
            status,
            metadata: None,
            score: None,
            destinations: Vec::new(),
            error: None,
        }
    }

    pub fn failed(group: &BookGroup, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(group, BookStatus::Failed)
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub processed: usize,
    pub metadata_only: usize,
    pub failed: usize,
    pub skipped: usize,
    pub books: Vec<BookOutcome>,
}

impl BatchResult {
    /// Record one finished book; each book is counted exactly once.
    pub fn record(&mut self, outcome: BookOutcome) {
        match outcome.status {
            BookStatus::Processed => self.processed += 1,
            BookStatus::MetadataOnly => self.metadata_only += 1,
            BookStatus::Skipped => self.skipped += 1,
            BookStatus::Failed => self.failed += 1,
        }
        self.books.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.books.len()
    }
}
