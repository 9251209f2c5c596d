//! Audible / Audnexus HTTP client
//!
//! Neither service needs an API key. Both rate limit aggressively, so the
//! orchestrator funnels all calls through a bounded queue.

use async_trait::async_trait;
use std::time::Duration;

use super::{adapter, dto};
use crate::config::ProviderConfig;
use crate::model::MetadataCandidate;
use crate::provider::{MetadataProvider, ProviderError, SearchQuery};

const USER_AGENT: &str = concat!("Audioshelf/", env!("CARGO_PKG_VERSION"));

/// Response groups requested from the catalog search
const RESPONSE_GROUPS: &str = "contributors,series,product_attrs,product_desc";

/// Catalog host for an Audible marketplace region.
pub fn catalog_base_url_for_region(region: &str) -> String {
    let tld = match region.to_ascii_lowercase().as_str() {
        "uk" => "co.uk",
        "ca" => "ca",
        "au" => "com.au",
        "de" => "de",
        "fr" => "fr",
        "it" => "it",
        "es" => "es",
        "in" => "in",
        "jp" => "co.jp",
        _ => "com",
    };
    format!("https://api.audible.{}", tld)
}

/// Provider backed by the Audible catalog (search) and Audnexus (lookup).
pub struct AudibleProvider {
    http_client: reqwest::Client,
    catalog_base_url: String,
    audnexus_base_url: String,
    region: String,
    search_limit: u32,
}

impl AudibleProvider {
    pub fn new(config: &ProviderConfig, search_limit: u32) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let catalog_base_url = config
            .catalog_base_url
            .clone()
            .unwrap_or_else(|| catalog_base_url_for_region(&config.region));

        Ok(Self {
            http_client,
            catalog_base_url: catalog_base_url.trim_end_matches('/').to_string(),
            audnexus_base_url: config.audnexus_base_url.trim_end_matches('/').to_string(),
            region: config.region.to_ascii_lowercase(),
            search_limit: search_limit.clamp(1, 50),
        })
    }

    async fn send_search_request(
        &self,
        query: &SearchQuery,
    ) -> Result<dto::CatalogSearchResponse, ProviderError> {
        let url = format!("{}/1.0/catalog/products", self.catalog_base_url);

        let mut params: Vec<(&str, String)> = vec![
            ("title", query.title.clone()),
            ("num_results", self.search_limit.to_string()),
            ("products_sort_by", "Relevance".to_string()),
            ("response_groups", RESPONSE_GROUPS.to_string()),
        ];
        if let Some(ref author) = query.author {
            params.push(("author", author.clone()));
        }
        if let Some(ref narrator) = query.narrator {
            params.push(("narrator", narrator.clone()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<dto::CatalogSearchResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn send_lookup_request(&self, asin: &str) -> Result<dto::AudnexusBook, ProviderError> {
        let url = format!("{}/books/{}", self.audnexus_base_url, asin);

        let response = self
            .http_client
            .get(&url)
            .query(&[("region", self.region.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<dto::AudnexusBook>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// Map HTTP status codes onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    if status.is_server_error() {
        return Err(ProviderError::Server {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        // Try to parse error response
        if let Ok(error) = response.json::<dto::ApiError>().await
            && let Some(message) = error.message.or(error.error)
        {
            return Err(ProviderError::InvalidResponse(message));
        }
        return Err(ProviderError::InvalidResponse(format!(
            "HTTP {}: {}",
            status,
            status.canonical_reason().unwrap_or("Unknown")
        )));
    }

    Ok(response)
}

#[async_trait]
impl MetadataProvider for AudibleProvider {
    async fn lookup_by_identifier(&self, id: &str) -> Result<MetadataCandidate, ProviderError> {
        let book = self.send_lookup_request(id).await?;
        adapter::from_audnexus(book)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("record {} has no title", id)))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataCandidate>, ProviderError> {
        let response = self.send_search_request(query).await?;
        let candidates: Vec<_> = response
            .products
            .into_iter()
            .filter_map(adapter::from_catalog_product)
            .collect();

        tracing::debug!(
            target: "provider::audible",
            title = %query.title,
            results = candidates.len(),
            "Catalog search finished"
        );
        Ok(candidates)
    }
}
