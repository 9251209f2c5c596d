//! Adapter layer: convert Audible / Audnexus DTOs to candidates
//!
//! This is the only place DTO types become domain types.

use super::dto;
use crate::model::{Contributor, MetadataCandidate, SeriesInfo};

/// Convert one catalog search product.
pub fn from_catalog_product(product: dto::CatalogProduct) -> Option<MetadataCandidate> {
    let title = non_blank(product.title)?;

    Some(MetadataCandidate {
        title,
        subtitle: non_blank(product.subtitle),
        authors: product
            .authors
            .into_iter()
            .map(|p| Contributor::new(p.name))
            .collect(),
        narrators: product
            .narrators
            .into_iter()
            .map(|p| Contributor::new(p.name))
            .collect(),
        series: product
            .series
            .into_iter()
            .next()
            .map(|s| SeriesInfo::new(s.title, s.sequence.as_deref())),
        asin: Some(product.asin),
        publisher: non_blank(product.publisher_name),
        genres: Vec::new(),
        release_year: product.release_date.as_deref().and_then(parse_year),
    })
}

/// Convert an Audnexus book record.
pub fn from_audnexus(book: dto::AudnexusBook) -> Option<MetadataCandidate> {
    let title = non_blank(book.title)?;

    // Audnexus mixes genres and free-form tags; keep only genres
    let genres = book
        .genres
        .into_iter()
        .filter(|g| g.genre_type.as_deref().is_none_or(|t| t == "genre"))
        .map(|g| g.name)
        .collect();

    Some(MetadataCandidate {
        title,
        subtitle: non_blank(book.subtitle),
        authors: book
            .authors
            .into_iter()
            .map(|p| Contributor::new(p.name))
            .collect(),
        narrators: book
            .narrators
            .into_iter()
            .map(|p| Contributor::new(p.name))
            .collect(),
        series: book
            .series_primary
            .map(|s| SeriesInfo::new(s.name, s.position.as_deref())),
        asin: Some(book.asin),
        publisher: non_blank(book.publisher_name),
        genres,
        release_year: book.release_date.as_deref().and_then(parse_year),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Leading four-digit year of a date string.
fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}
