//! Web search with provider fallback.
//!
//! Providers are tried in order (hosted first, public fallback last):
//! - A provider that errors or returns zero results hands over to the next
//! - The last provider's result is returned as-is, even if empty
//! - If every provider errored, a single diagnostic snippet is returned
//!
//! [`WebSearchClient::search`] never returns an error.

pub mod duckduckgo;
pub mod enrich;
pub mod tavily;

pub use duckduckgo::DuckDuckGoProvider;
pub use enrich::{ContentFetcher, ReaderFetcher};
pub use tavily::TavilyProvider;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::error::SearchError;

/// URL used when a provider gives none.
pub const PLACEHOLDER_URL: &str = "about:blank";

/// Which provider produced a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Tavily,
    DuckDuckGo,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::Tavily => "tavily",
            SearchSource::DuckDuckGo => "duckduckgo",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub source: SearchSource,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl WebSearchSnippet {
    /// Build a snippet, synthesizing a title and URL when absent.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        source: SearchSource,
        raw: serde_json::Value,
    ) -> Self {
        let snippet = snippet.into().trim().to_string();
        let url = url.into().trim().to_string();
        let mut title = title.into().trim().to_string();

        if title.is_empty() {
            title = synthesize_title(&snippet, &url);
        }

        Self {
            title,
            url: if url.is_empty() {
                PLACEHOLDER_URL.to_string()
            } else {
                url
            },
            snippet,
            content: None,
            source,
            raw,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.content = Some(content);
        }
        self
    }

    /// Whether the URL points somewhere fetchable.
    pub fn has_real_url(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

fn synthesize_title(snippet: &str, url: &str) -> String {
    let from_snippet: String = snippet.chars().take(40).collect();
    if !from_snippet.is_empty() {
        return from_snippet;
    }
    if !url.is_empty() {
        return url.to_string();
    }
    "Untitled result".to_string()
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn source(&self) -> SearchSource;

    async fn search(&self, query: &str, top_k: usize)
    -> Result<Vec<WebSearchSnippet>, SearchError>;
}

/// Which providers a search may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Primary providers in order, then the fallback.
    PrimaryThenFallback,
    /// Skip primaries and go straight to the fallback.
    FallbackOnly,
}

/// Search client over an ordered provider chain.
pub struct WebSearchClient {
    primaries: Vec<Arc<dyn SearchProvider>>,
    fallback: Arc<dyn SearchProvider>,
    policy: SearchPolicy,
    fetcher: Option<Arc<dyn ContentFetcher>>,
}

impl WebSearchClient {
    /// Client with only a fallback provider.
    pub fn new(fallback: Arc<dyn SearchProvider>) -> Self {
        Self {
            primaries: Vec::new(),
            fallback,
            policy: SearchPolicy::PrimaryThenFallback,
            fetcher: None,
        }
    }

    /// Append a primary provider (tried before the fallback, in insertion order).
    pub fn with_primary(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.primaries.push(provider);
        self
    }

    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable full-content enrichment through `fetcher`.
    pub fn with_enrichment(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the standard Tavily → DuckDuckGo chain from configuration.
    pub fn from_config(config: &SearchConfig) -> Self {
        let mut client = Self::new(Arc::new(DuckDuckGoProvider::new(
            config.duckduckgo_base_url.clone(),
        )))
        .with_primary(Arc::new(TavilyProvider::new(
            config.tavily_base_url.clone(),
            config.tavily_api_key.clone(),
        )))
        .with_policy(if config.use_hosted_search {
            SearchPolicy::PrimaryThenFallback
        } else {
            SearchPolicy::FallbackOnly
        });

        if config.enrich_full_content {
            client = client.with_enrichment(Arc::new(ReaderFetcher::new(
                config.content_reader_base_url.clone(),
            )));
        }
        client
    }

    fn chain(&self) -> Vec<&Arc<dyn SearchProvider>> {
        let mut chain: Vec<&Arc<dyn SearchProvider>> = match self.policy {
            SearchPolicy::PrimaryThenFallback => self.primaries.iter().collect(),
            SearchPolicy::FallbackOnly => Vec::new(),
        };
        chain.push(&self.fallback);
        chain
    }

    /// Search the web. Never fails; see the module docs for the fallback rules.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<WebSearchSnippet> {
        let mut errors: Vec<(SearchSource, String)> = Vec::new();
        let mut any_succeeded = false;

        for provider in self.chain() {
            let source = provider.source();
            match provider.search(query, top_k).await {
                Ok(mut results) if !results.is_empty() => {
                    results.truncate(top_k.max(1));
                    info!(
                        provider = %source,
                        query = %query,
                        count = results.len(),
                        "Web search succeeded"
                    );
                    return self.enrich(results).await;
                }
                Ok(_) => {
                    any_succeeded = true;
                    info!(provider = %source, query = %query, "Web search returned no results");
                }
                Err(e) => {
                    warn!(provider = %source, query = %query, error = %e, "Web search provider failed");
                    errors.push((source, e.to_string()));
                }
            }
        }

        if any_succeeded {
            return Vec::new();
        }

        vec![unavailable_snippet(query, self.fallback.source(), &errors)]
    }

    async fn enrich(&self, snippets: Vec<WebSearchSnippet>) -> Vec<WebSearchSnippet> {
        match &self.fetcher {
            Some(fetcher) => enrich::enrich_snippets(fetcher.as_ref(), snippets).await,
            None => snippets,
        }
    }
}

fn unavailable_snippet(
    query: &str,
    source: SearchSource,
    errors: &[(SearchSource, String)],
) -> WebSearchSnippet {
    let details: Vec<String> = errors.iter().map(|(s, e)| format!("{s}: {e}")).collect();
    let raw = serde_json::json!({
        "query": query,
        "errors": errors
            .iter()
            .map(|(s, e)| serde_json::json!({"provider": s.as_str(), "error": e}))
            .collect::<Vec<_>>(),
    });
    WebSearchSnippet::new(
        "Search service unavailable",
        PLACEHOLDER_URL,
        format!(
            "Web search is temporarily unavailable for \"{query}\" ({})",
            details.join("; ")
        ),
        source,
        raw,
    )
}

/// Render snippets as a numbered citation block: `【i】title\nurl\nsnippet`.
///
/// Enriched full content, when present, follows the snippet.
pub fn format_citations(snippets: &[WebSearchSnippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut entry = format!("【{}】{}\n{}\n{}", i + 1, s.title, s.url, s.snippet);
            if let Some(content) = &s.content {
                entry.push('\n');
                entry.push_str(content);
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted provider for fallback tests.
    pub(crate) struct StubProvider {
        pub source: SearchSource,
        pub outcome: Result<Vec<WebSearchSnippet>, String>,
        pub calls: AtomicUsize,
    }

    impl StubProvider {
        pub(crate) fn ok(source: SearchSource, titles: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                source,
                outcome: Ok(titles
                    .iter()
                    .map(|t| {
                        WebSearchSnippet::new(
                            *t,
                            format!("https://example.com/{t}"),
                            format!("about {t}"),
                            source,
                            serde_json::Value::Null,
                        )
                    })
                    .collect()),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing(source: SearchSource, reason: &str) -> Arc<Self> {
            Arc::new(Self {
                source,
                outcome: Err(reason.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn source(&self) -> SearchSource {
            self.source
        }

        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<WebSearchSnippet>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .clone()
                .map_err(|reason| SearchError::RequestFailed {
                    provider: self.source.to_string(),
                    reason,
                })
        }
    }

    #[tokio::test]
    async fn primary_results_win() {
        let primary = StubProvider::ok(SearchSource::Tavily, &["a", "b"]);
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &["z"]);
        let client = WebSearchClient::new(fallback.clone()).with_primary(primary.clone());

        let results = client.search("rust books", 5).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, SearchSource::Tavily);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_error_falls_back() {
        let primary = StubProvider::failing(SearchSource::Tavily, "boom");
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &["z"]);
        let client = WebSearchClient::new(fallback.clone()).with_primary(primary);

        let results = client.search("q", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, SearchSource::DuckDuckGo);
        assert_eq!(results[0].title, "z");
    }

    #[tokio::test]
    async fn primary_empty_falls_back() {
        let primary = StubProvider::ok(SearchSource::Tavily, &[]);
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &["z"]);
        let client = WebSearchClient::new(fallback.clone()).with_primary(primary.clone());

        let results = client.search("q", 5).await;
        assert_eq!(results[0].source, SearchSource::DuckDuckGo);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_empty_returns_empty() {
        let primary = StubProvider::failing(SearchSource::Tavily, "down");
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &[]);
        let client = WebSearchClient::new(fallback).with_primary(primary);

        assert!(client.search("q", 5).await.is_empty());
    }

    #[tokio::test]
    async fn both_failing_yields_single_diagnostic_snippet() {
        let primary = StubProvider::failing(SearchSource::Tavily, "timeout");
        let fallback = StubProvider::failing(SearchSource::DuckDuckGo, "dns");
        let client = WebSearchClient::new(fallback).with_primary(primary);

        let results = client.search("q", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, SearchSource::DuckDuckGo);
        assert_eq!(results[0].url, PLACEHOLDER_URL);
        assert!(results[0].snippet.contains("timeout"));
        assert!(results[0].snippet.contains("dns"));
        assert_eq!(results[0].raw["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fallback_only_policy_skips_primary() {
        let primary = StubProvider::ok(SearchSource::Tavily, &["a"]);
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &["z"]);
        let client = WebSearchClient::new(fallback)
            .with_primary(primary.clone())
            .with_policy(SearchPolicy::FallbackOnly);

        let results = client.search("q", 5).await;
        assert_eq!(results[0].source, SearchSource::DuckDuckGo);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_are_truncated_to_top_k() {
        let primary = StubProvider::ok(SearchSource::Tavily, &["a", "b", "c"]);
        let fallback = StubProvider::ok(SearchSource::DuckDuckGo, &[]);
        let client = WebSearchClient::new(fallback).with_primary(primary);

        assert_eq!(client.search("q", 2).await.len(), 2);
    }

    #[test]
    fn snippet_synthesizes_title_and_url() {
        let s = WebSearchSnippet::new(
            "  ",
            "",
            "A long description of a book about systems programming",
            SearchSource::DuckDuckGo,
            serde_json::Value::Null,
        );
        assert_eq!(s.title.chars().count(), 40);
        assert_eq!(s.url, PLACEHOLDER_URL);
        assert!(!s.has_real_url());

        let bare = WebSearchSnippet::new("", "", "", SearchSource::Tavily, serde_json::Value::Null);
        assert_eq!(bare.title, "Untitled result");
    }

    #[test]
    fn citations_are_numbered_and_blank_line_separated() {
        let snippets = vec![
            WebSearchSnippet::new("T1", "https://a", "s1", SearchSource::Tavily, serde_json::Value::Null),
            WebSearchSnippet::new("T2", "https://b", "s2", SearchSource::Tavily, serde_json::Value::Null),
        ];
        assert_eq!(
            format_citations(&snippets),
            "【1】T1\nhttps://a\ns1\n\n【2】T2\nhttps://b\ns2"
        );
    }
}
