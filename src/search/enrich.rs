//! Best-effort full-content enrichment for search snippets.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::WebSearchSnippet;
use crate::error::SearchError;

pub const DEFAULT_READER_BASE_URL: &str = "https://r.jina.ai/";

/// Fetched page text is cut to this many characters.
pub const MAX_CONTENT_CHARS: usize = 6000;

const READER_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches the readable text of a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, SearchError>;
}

/// Fetches page text through a reader endpoint (`{base}{url}`).
pub struct ReaderFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl ReaderFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ContentFetcher for ReaderFetcher {
    async fn fetch(&self, url: &str) -> Result<String, SearchError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, url))
            .timeout(READER_TIMEOUT)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed {
                provider: "reader".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                provider: "reader".into(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        resp.text().await.map_err(|e| SearchError::InvalidResponse {
            provider: "reader".into(),
            reason: e.to_string(),
        })
    }
}

/// Fetch full content for every snippet that has a real URL and no content.
///
/// Fetches run concurrently. A failed fetch leaves its snippet unchanged.
pub async fn enrich_snippets(
    fetcher: &dyn ContentFetcher,
    snippets: Vec<WebSearchSnippet>,
) -> Vec<WebSearchSnippet> {
    let tasks = snippets.into_iter().map(|snippet| async move {
        if snippet.content.is_some() || !snippet.has_real_url() {
            return snippet;
        }
        match fetcher.fetch(&snippet.url).await {
            Ok(text) => {
                let text: String = text.trim().chars().take(MAX_CONTENT_CHARS).collect();
                debug!(url = %snippet.url, chars = text.chars().count(), "Enriched snippet");
                snippet.with_content(text)
            }
            Err(e) => {
                warn!(url = %snippet.url, error = %e, "Content enrichment failed, keeping snippet");
                snippet
            }
        }
    });

    join_all(tasks).await
}
