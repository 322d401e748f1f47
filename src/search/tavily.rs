//! Hosted search via the Tavily API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SearchProvider, SearchSource, WebSearchSnippet};
use crate::error::SearchError;

/// Fixed per-call timeout for the hosted provider.
pub const TAVILY_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Tavily search provider.
pub struct TavilyProvider {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl TavilyProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

fn to_snippet(raw: serde_json::Value) -> WebSearchSnippet {
    let parsed: TavilyResult = serde_json::from_value(raw.clone()).unwrap_or_default();
    let snippet = WebSearchSnippet::new(
        parsed.title,
        parsed.url,
        parsed.content,
        SearchSource::Tavily,
        raw,
    );
    match parsed.raw_content {
        Some(content) => snippet.with_content(content),
        None => snippet,
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn source(&self) -> SearchSource {
        SearchSource::Tavily
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<WebSearchSnippet>, SearchError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| SearchError::MissingCredential {
                provider: "tavily".into(),
                key: "TAVILY_API_KEY".into(),
            })?;

        let request = TavilySearchRequest {
            query,
            max_results: top_k,
            search_depth: "basic",
            include_raw_content: false,
        };

        let resp = self
            .client
            .post(self.search_url())
            .bearer_auth(api_key.expose_secret())
            .timeout(TAVILY_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        provider: "tavily".into(),
                        timeout: TAVILY_TIMEOUT,
                    }
                } else {
                    SearchError::RequestFailed {
                        provider: "tavily".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                provider: "tavily".into(),
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: TavilySearchResponse =
            resp.json().await.map_err(|e| SearchError::InvalidResponse {
                provider: "tavily".into(),
                reason: e.to_string(),
            })?;

        debug!(query = %query, count = parsed.results.len(), "Tavily response parsed");

        Ok(parsed.results.into_iter().map(to_snippet).collect())
    }
}
