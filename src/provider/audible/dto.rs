//! Audible / Audnexus Data Transfer Objects
//!
//! These types mirror the JSON the two services return. Do not use them
//! outside the audible module; the adapter converts them to
//! [`MetadataCandidate`](crate::model::MetadataCandidate).

use serde::{Deserialize, Serialize};

/// `GET /1.0/catalog/products` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogSearchResponse {
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
    pub total_results: Option<u32>,
}

/// A product in a catalog search
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogProduct {
    pub asin: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<CatalogPerson>,
    #[serde(default)]
    pub narrators: Vec<CatalogPerson>,
    #[serde(default)]
    pub series: Vec<CatalogSeries>,
    pub publisher_name: Option<String>,
    /// "YYYY-MM-DD"
    pub release_date: Option<String>,
    pub language: Option<String>,
    pub runtime_length_min: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogPerson {
    pub asin: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogSeries {
    pub asin: Option<String>,
    pub title: String,
    /// Position as printed, e.g. "1" or "2.5"
    pub sequence: Option<String>,
}

/// `GET /books/{asin}` response from Audnexus
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudnexusBook {
    pub asin: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<AudnexusPerson>,
    #[serde(default)]
    pub narrators: Vec<AudnexusPerson>,
    pub series_primary: Option<AudnexusSeries>,
    pub series_secondary: Option<AudnexusSeries>,
    pub publisher_name: Option<String>,
    /// ISO timestamp, e.g. "2010-08-31T00:00:00.000Z"
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<AudnexusGenre>,
    pub language: Option<String>,
    pub runtime_length_min: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudnexusPerson {
    pub asin: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudnexusSeries {
    pub asin: Option<String>,
    pub name: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudnexusGenre {
    pub asin: Option<String>,
    pub name: String,
    /// "genre" or "tag"
    #[serde(rename = "type")]
    pub genre_type: Option<String>,
}

/// Error body returned by Audnexus
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
