//! Inferring a book's identity from its filenames and embedded tags.

use regex::Regex;
use std::sync::LazyLock;

use crate::metadata::TagRecord;
use crate::model::{BookGroup, InferredIdentity, SeriesInfo};

static ASIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(B0[0-9A-Z]{8})\b").expect("valid regex"));
static BRACKETED_ISBN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{9}[\dX])\]").expect("valid regex"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("valid regex"));

/// Stems that say nothing about the book itself.
const GENERIC_NAMES: &[&str] = &[
    "chapter", "chapters", "track", "part", "disc", "cd", "audiobook", "book", "audio",
];

/// Find a catalog identifier in free text.
pub fn extract_asin(text: &str) -> Option<String> {
    ASIN.captures(text)
        .or_else(|| BRACKETED_ISBN.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn strip_noise(text: &str) -> String {
    BRACKETED
        .replace_all(text, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_generic(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.is_empty()
        || lower.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
        || GENERIC_NAMES.contains(&lower.as_str())
}

/// Identity guessed from the group name, falling back to the directory name
/// when the files carry only generic names like "Chapter".
pub fn identity_from_group(group: &BookGroup) -> InferredIdentity {
    let directory_name = group
        .directory
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let asin = group
        .files
        .iter()
        .find_map(|f| extract_asin(&f.name))
        .or_else(|| extract_asin(directory_name));

    let mut base = strip_noise(&group.name);
    if is_generic(&base) {
        base = strip_noise(directory_name);
    }

    let (author, title) = match base.split_once(" - ") {
        Some((author, title)) if !author.trim().is_empty() && !title.trim().is_empty() => {
            (Some(author.trim().to_string()), title.trim().to_string())
        }
        _ => (None, base.trim().to_string()),
    };

    InferredIdentity {
        title,
        author,
        narrator: None,
        series: None,
        asin,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Identity read from embedded tags.
///
/// Audiobooks usually carry the book title in the album tag and the author
/// in the album artist tag, so those take precedence.
pub fn identity_from_tags(tags: &TagRecord) -> InferredIdentity {
    InferredIdentity {
        title: non_empty(&tags.album)
            .or_else(|| non_empty(&tags.title))
            .unwrap_or_default(),
        author: non_empty(&tags.album_artist).or_else(|| non_empty(&tags.artist)),
        narrator: non_empty(&tags.narrator),
        series: non_empty(&tags.series).map(|name| SeriesInfo {
            name,
            position: non_empty(&tags.series_part),
        }),
        asin: non_empty(&tags.asin),
    }
}

/// Tags win where present; the filename fills the gaps.
pub fn infer_identity(group: &BookGroup, tags: Option<&TagRecord>) -> InferredIdentity {
    let from_name = identity_from_group(group);
    match tags {
        Some(tags) => {
            let mut identity = identity_from_tags(tags);
            identity.merge(&from_name);
            identity
        }
        None => from_name,
    }
}
