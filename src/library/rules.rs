//! Filename heuristics for grouping.
//!
//! Key derivation runs an ordered list of named stripping rules over a file
//! stem. Each rule is a pure `fn(&str) -> String` so it can be tested on its
//! own and the list can be reordered without touching the pipeline.
//!
//! Titles that legitimately end in "Part N" or start with a number are
//! stripped like any other name; there is no disambiguation.

use regex::Regex;
use std::sync::LazyLock;

/// A named stripping step.
pub struct StripRule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Stripping rules, applied in order.
pub const KEY_STRIP_RULES: &[StripRule] = &[
    StripRule {
        name: "leading_number",
        apply: strip_leading_number,
    },
    StripRule {
        name: "track_token",
        apply: strip_track_token,
    },
    StripRule {
        name: "part_suffix",
        apply: strip_part_suffix,
    },
];

/// Cleaned names shorter than this fall back to the raw stem.
pub const MIN_CLEAN_LEN: usize = 3;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*[-_.]*\s*").expect("valid regex"));
static TRACK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:track|chapter)[\s_-]*\d+").expect("valid regex"));
static PART_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s_\-.,]+)(?:part|disc|disk|cd)[\s_-]*\d+\s*$").expect("valid regex")
});
static EDGE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s_\-.]+|[\s_\-.]+$").expect("valid regex"));

/// Track-number patterns, tried in order; first match wins.
static TRACK_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)track[\s_]*(\d+)",
        r"(?i)chapter[\s_]*(\d+)",
        r"^(\d+)\s",
        r"\s(\d+)\.[^.]+$",
        r"(?i)(?:part|disc)[\s_]*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

fn trim_separators(s: &str) -> String {
    EDGE_SEPARATORS.replace_all(s, "").into_owned()
}

/// "01 - Chapter" -> "Chapter"
pub fn strip_leading_number(stem: &str) -> String {
    trim_separators(&LEADING_NUMBER.replace(stem, ""))
}

/// "Book_Track07" -> "Book", "Chapter12 Intro" -> "Intro"
pub fn strip_track_token(stem: &str) -> String {
    trim_separators(&TRACK_TOKEN.replace_all(stem, ""))
}

/// "Book1_Part2" -> "Book1", "Dune Disc 3" -> "Dune"
pub fn strip_part_suffix(stem: &str) -> String {
    trim_separators(&PART_SUFFIX.replace(stem, ""))
}

/// Run every rule in order and apply the short-result fallback.
pub fn clean_title(stem: &str) -> String {
    let cleaned = KEY_STRIP_RULES
        .iter()
        .fold(stem.to_string(), |acc, rule| (rule.apply)(&acc));

    if cleaned.chars().count() < MIN_CLEAN_LEN {
        stem.to_string()
    } else {
        cleaned
    }
}

/// Directory-scoped, lower-cased grouping key.
pub fn group_key(directory_name: &str, stem: &str) -> String {
    format!("{}_{}", directory_name, clean_title(stem)).to_lowercase()
}

/// Playback-order number inferred from a file name (with extension).
///
/// Returns 0 when no pattern matches.
pub fn track_number(file_name: &str) -> u32 {
    TRACK_NUMBER_PATTERNS
        .iter()
        .find_map(|re| re.captures(file_name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
