//! Book retrieval client.
//!
//! The retrieval service owns the book index. Two operations:
//! - `text_search`: one free-text query
//! - `multi_query`: the service splits a markdown brief into sub-queries,
//!   merges (and optionally reranks) their hits, and returns one
//!   consolidated, LLM-ready text block
//!
//! An empty `context_plain_text` with no books is "no result". That is not
//! an error here; callers decide what it means for them.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::error::RetrievalError;

const RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-query search parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

impl TextSearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            filters: None,
        }
    }
}

/// Markdown-driven multi-query search parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiQueryRequest {
    pub markdown: String,
    pub per_query_top_k: usize,
    pub final_top_k: usize,
    pub enable_rerank: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

/// What the retrieval service returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(
        default,
        rename = "contextPlainText",
        alias = "context_plain_text"
    )]
    pub context_plain_text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RetrievalResult {
    /// Structured book records, from `metadata.books` or `metadata.results`.
    pub fn books(&self) -> &[serde_json::Value] {
        ["books", "results"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(|v| v.as_array()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_context(&self) -> bool {
        !self.context_plain_text.trim().is_empty()
    }

    /// No context text and no structured books.
    pub fn is_empty(&self) -> bool {
        !self.has_context() && self.books().is_empty()
    }
}

/// The external book database.
#[async_trait]
pub trait BookRetriever: Send + Sync {
    async fn text_search(&self, request: TextSearchRequest)
    -> Result<RetrievalResult, RetrievalError>;

    async fn multi_query(&self, request: MultiQueryRequest)
    -> Result<RetrievalResult, RetrievalError>;
}

/// HTTP client for the retrieval service.
pub struct HttpBookRetriever {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpBookRetriever {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    async fn post<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<RetrievalResult, RetrievalError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.client.post(url).timeout(RETRIEVAL_TIMEOUT).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout {
                    operation,
                    timeout: RETRIEVAL_TIMEOUT,
                }
            } else {
                RetrievalError::RequestFailed {
                    operation,
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                operation,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let result: RetrievalResult =
            resp.json()
                .await
                .map_err(|e| RetrievalError::InvalidResponse {
                    operation,
                    reason: e.to_string(),
                })?;

        debug!(
            operation,
            context_chars = result.context_plain_text.chars().count(),
            books = result.books().len(),
            "Retrieval response parsed"
        );
        Ok(result)
    }
}

#[async_trait]
impl BookRetriever for HttpBookRetriever {
    async fn text_search(
        &self,
        request: TextSearchRequest,
    ) -> Result<RetrievalResult, RetrievalError> {
        info!(query = %request.query, top_k = request.top_k, "Book text search");
        self.post("text_search", "text-search", &request).await
    }

    async fn multi_query(
        &self,
        request: MultiQueryRequest,
    ) -> Result<RetrievalResult, RetrievalError> {
        info!(
            brief_chars = request.markdown.chars().count(),
            per_query_top_k = request.per_query_top_k,
            final_top_k = request.final_top_k,
            rerank = request.enable_rerank,
            "Book multi-query search"
        );
        self.post("multi_query", "multi-query", &request).await
    }
}
