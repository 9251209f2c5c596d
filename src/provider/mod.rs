//! Remote metadata providers.
//!
//! The orchestrator talks to a [`MetadataProvider`]; each provider keeps its
//! wire types private and converts them into [`MetadataCandidate`]s in a
//! single adapter.

pub mod audible;

use async_trait::async_trait;

use crate::model::MetadataCandidate;
use crate::queue::QueueCancelled;

pub use audible::AudibleProvider;

/// A free-text catalog search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub author: Option<String>,
    pub narrator: Option<String>,
}

impl SearchQuery {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_narrator(mut self, narrator: Option<String>) -> Self {
        self.narrator = narrator;
        self
    }
}

/// Provider failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("No record found")]
    NotFound,

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Cancelled(#[from] QueueCancelled),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Network(_) | ProviderError::Server { .. }
        )
    }
}

/// Source of book metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Look up one record by catalog identifier (ASIN).
    async fn lookup_by_identifier(&self, id: &str) -> Result<MetadataCandidate, ProviderError>;

    /// Free-text search. An empty list is a valid answer.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataCandidate>, ProviderError>;
}
