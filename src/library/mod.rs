//! Groups scanned files into books.
//!
//! Files are sorted by name, keyed with [`rules::group_key`] within their
//! directory, and collected into [`BookGroup`]s in first-seen order. Inside a
//! group, files are ordered by inferred track number with the file name as
//! tie-breaker.

pub mod rules;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::{BookGroup, FileEntry};

/// Partition `files` into book groups.
///
/// Every input file ends up in exactly one group, and no group is empty.
pub fn group_files(mut files: Vec<FileEntry>) -> Vec<BookGroup> {
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut groups: Vec<BookGroup> = Vec::new();
    // The key only sees the directory base name, so two `CD1` folders under
    // different parents must still be told apart by full path.
    let mut index: HashMap<(PathBuf, String), usize> = HashMap::new();

    for file in files {
        let stem = file.stem().to_string();
        let key = rules::group_key(file.directory_name(), &stem);
        let slot = (file.directory.clone(), key.clone());

        match index.get(&slot) {
            Some(&i) => groups[i].push(file),
            None => {
                let name = rules::clean_title(&stem);
                index.insert(slot, groups.len());
                groups.push(BookGroup::new(key, name, file));
            }
        }
    }

    for group in &mut groups {
        group
            .files
            .sort_by_cached_key(|f| (rules::track_number(&f.name), f.name.clone()));
    }

    tracing::debug!(target: "library::group", books = groups.len(), "Grouped files");
    groups
}
