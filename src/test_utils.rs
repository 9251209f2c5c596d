//! Test utilities and fixtures.
//!
//! Common helpers shared by the unit tests: synthetic file entries,
//! a recording event sink, candidate factories and on-disk audiobook
//! fixtures.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::events::{Event, EventKind, EventSink};
use crate::model::{Contributor, FileEntry, MetadataCandidate, SeriesInfo};

/// A [`FileEntry`] for `path` without touching the filesystem.
///
/// ```ignore
/// let entry = file_entry("/books/Dune/01 - Dune.mp3", 1024);
/// assert_eq!(entry.extension, "mp3");
/// ```
pub fn file_entry(path: &str, size: u64) -> FileEntry {
    let path = PathBuf::from(path);
    FileEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        size,
        created: None,
        modified: None,
        path,
    }
}

/// Event sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Events of one kind, in emission order.
    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) -> usize {
        self.events.lock().push(event);
        1
    }
}

/// A fully populated candidate.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let custom = MetadataCandidate {
///     title: "Other".to_string(),
///     ..mock_candidate("Dune", "Frank Herbert")
/// };
/// ```
pub fn mock_candidate(title: &str, author: &str) -> MetadataCandidate {
    MetadataCandidate {
        title: title.to_string(),
        authors: vec![Contributor::new(author)],
        narrators: vec![Contributor::new("Scott Brick")],
        asin: Some("B002V1OF70".to_string()),
        publisher: Some("Macmillan Audio".to_string()),
        genres: vec!["Science Fiction".to_string()],
        release_year: Some(2007),
        ..Default::default()
    }
}

/// [`mock_candidate`] in a series.
pub fn mock_series_candidate(
    title: &str,
    author: &str,
    series: &str,
    position: &str,
) -> MetadataCandidate {
    MetadataCandidate {
        series: Some(SeriesInfo::new(series, Some(position))),
        ..mock_candidate(title, author)
    }
}

/// Write a file of `size` bytes at `root/relative`, creating parents.
pub fn write_audio_file(root: &Path, relative: &str, size: usize) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(&path, vec![0u8; size]).expect("Failed to write fixture file");
    path
}
