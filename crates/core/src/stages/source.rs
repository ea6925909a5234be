//! Raw lead discovery seam.

use async_trait::async_trait;
use thiserror::Error;

/// A business as the discovery backend returns it, before any
/// normalization or persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLead {
    pub business_name: String,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Error type for discovery.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("lead source unavailable: {0}")]
    Unavailable(String),
}

/// Trait for lead discovery backends (maps APIs, directory scrapers).
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Find up to `limit` businesses matching `query` around `location`.
    async fn discover(
        &self,
        query: &str,
        location: &str,
        limit: i64,
    ) -> Result<Vec<RawLead>, SourceError>;
}
