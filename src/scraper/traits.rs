use crate::model::{NetworkError, ScrapeRequest};

/// Source of raw result pages. Implementations own transport concerns
/// (user agent, retries); callers only see the page body or a `NetworkError`.
#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch_page(&self, req: &ScrapeRequest) -> Result<String, NetworkError>;
}
