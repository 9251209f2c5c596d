//! Confidence scoring of provider candidates against an inferred identity.
//!
//! The score is a weighted sum normalized by the weight of the fields that
//! are present on both sides:
//!
//! | Field  | Weight | Sub-score |
//! |--------|--------|-----------|
//! | title  | 60     | string match |
//! | author | 30     | best string match over candidate authors |
//! | series | 10     | `0.7 * name match + 0.3 * position match` |
//!
//! With no comparable field the score is 0. Only [`rank_metadata_results`]
//! is meant for callers; the sub-scores are exposed for testing.

pub mod identity;

use crate::model::{InferredIdentity, MatchResult, MetadataCandidate, SeriesInfo};

const TITLE_WEIGHT: f64 = 60.0;
const AUTHOR_WEIGHT: f64 = 30.0;
const SERIES_WEIGHT: f64 = 10.0;

const SERIES_NAME_SHARE: f64 = 0.7;
const SERIES_POSITION_SHARE: f64 = 0.3;

/// Words shorter than this are ignored by the word-overlap measure.
const MIN_WORD_LEN: usize = 3;

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two free-text strings in `[0, 1]`.
///
/// Exact match after normalization is 1. If one contains the other the
/// score is `0.8 * shorter / longer`, measured on the trimmed inputs.
/// Otherwise it blends word overlap (70%) with positional character
/// overlap (30%).
pub fn calculate_string_match_score(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    if na.contains(nb.as_str()) || nb.contains(na.as_str()) {
        let la = a.trim().chars().count() as f64;
        let lb = b.trim().chars().count() as f64;
        return 0.8 * (la.min(lb) / la.max(lb));
    }

    0.7 * word_overlap_ratio(&na, &nb) + 0.3 * positional_overlap_ratio(&na, &nb)
}

/// Share of significant words that match (equal or contained either way).
fn word_overlap_ratio(a: &str, b: &str) -> f64 {
    let words_a: Vec<&str> = a.split(' ').filter(|w| w.chars().count() >= MIN_WORD_LEN).collect();
    let words_b: Vec<&str> = b.split(' ').filter(|w| w.chars().count() >= MIN_WORD_LEN).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let matches = words_a
        .iter()
        .filter(|&&wa| {
            words_b
                .iter()
                .any(|&wb| wa == wb || wa.contains(wb) || wb.contains(wa))
        })
        .count()
        .min(words_a.len().min(words_b.len()));

    matches as f64 / words_a.len().max(words_b.len()) as f64
}

/// Characters equal at the same index, over the longer length.
fn positional_overlap_ratio(a: &str, b: &str) -> f64 {
    let ca: Vec<char> = a.chars().collect();
    let cb: Vec<char> = b.chars().collect();
    let longest = ca.len().max(cb.len());
    if longest == 0 {
        return 0.0;
    }
    let same = ca.iter().zip(cb.iter()).filter(|(x, y)| x == y).count();
    same as f64 / longest as f64
}

fn positions_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a == b {
        return true;
    }
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

fn series_score(identity: &SeriesInfo, candidate: &SeriesInfo) -> f64 {
    let name = calculate_string_match_score(&identity.name, &candidate.name);
    let position = match (&identity.position, &candidate.position) {
        (Some(a), Some(b)) if positions_match(a, b) => 1.0,
        _ => 0.0,
    };
    SERIES_NAME_SHARE * name + SERIES_POSITION_SHARE * position
}

fn present(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Confidence in `[0, 1]` that `candidate` describes `identity`.
pub fn score(identity: &InferredIdentity, candidate: &MetadataCandidate) -> f64 {
    let mut total = 0.0;
    let mut max = 0.0;

    if present(&identity.title) && present(&candidate.title) {
        total += calculate_string_match_score(&identity.title, &candidate.title) * TITLE_WEIGHT;
        max += TITLE_WEIGHT;
    }

    if let Some(author) = identity.author.as_deref().filter(|a| present(a)) {
        let named: Vec<&str> = candidate
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .filter(|n| present(n))
            .collect();
        if !named.is_empty() {
            let best = named
                .iter()
                .map(|n| calculate_string_match_score(author, n))
                .fold(0.0, f64::max);
            total += best * AUTHOR_WEIGHT;
            max += AUTHOR_WEIGHT;
        }
    }

    if let (Some(ours), Some(theirs)) = (&identity.series, &candidate.series)
        && present(&ours.name)
        && present(&theirs.name)
    {
        total += series_score(ours, theirs) * SERIES_WEIGHT;
        max += SERIES_WEIGHT;
    }

    if max == 0.0 {
        return 0.0;
    }
    (total / max).clamp(0.0, 1.0)
}

/// Score every candidate and sort by descending score.
///
/// The sort is stable, so equal scores keep their input order.
pub fn rank_metadata_results(
    identity: &InferredIdentity,
    candidates: Vec<MetadataCandidate>,
) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = candidates
        .into_iter()
        .map(|candidate| MatchResult {
            score: score(identity, &candidate),
            candidate,
        })
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
}
