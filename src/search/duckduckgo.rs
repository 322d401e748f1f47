//! Public fallback search via the DuckDuckGo instant answer API.
//!
//! The API returns a loose topic tree rather than ranked results:
//! - `AbstractText`/`AbstractURL`/`Heading` describe the main topic
//! - `Results` and `RelatedTopics` hold entries with `Text`/`FirstURL`
//! - `RelatedTopics` may nest groups as `{Name, Topics: [...]}`
//!
//! Everything is flattened in document order into snippets.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{SearchProvider, SearchSource, WebSearchSnippet};
use crate::error::SearchError;

pub const DEFAULT_DUCKDUCKGO_BASE_URL: &str = "https://api.duckduckgo.com";

const DUCKDUCKGO_TIMEOUT: Duration = Duration::from_secs(10);

/// DuckDuckGo instant answer provider.
pub struct DuckDuckGoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl DuckDuckGoProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn source(&self) -> SearchSource {
        SearchSource::DuckDuckGo
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<WebSearchSnippet>, SearchError> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .timeout(DUCKDUCKGO_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        provider: "duckduckgo".into(),
                        timeout: DUCKDUCKGO_TIMEOUT,
                    }
                } else {
                    SearchError::RequestFailed {
                        provider: "duckduckgo".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                provider: "duckduckgo".into(),
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        // DuckDuckGo sometimes serves JSON as `application/x-javascript`.
        let text = resp.text().await.map_err(|e| SearchError::RequestFailed {
            provider: "duckduckgo".into(),
            reason: e.to_string(),
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|e| SearchError::InvalidResponse {
            provider: "duckduckgo".into(),
            reason: e.to_string(),
        })?;

        let mut snippets = normalize(&body);
        snippets.truncate(top_k);
        debug!(query = %query, count = snippets.len(), "DuckDuckGo response normalized");
        Ok(snippets)
    }
}

/// Flatten an instant-answer body into snippets.
pub fn normalize(body: &Value) -> Vec<WebSearchSnippet> {
    let mut out = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    if !abstract_text.is_empty() {
        let title = first_non_empty(&[str_field(body, "Heading"), str_field(body, "AbstractSource")]);
        out.push(WebSearchSnippet::new(
            title,
            str_field(body, "AbstractURL"),
            abstract_text,
            SearchSource::DuckDuckGo,
            serde_json::json!({
                "Heading": body.get("Heading"),
                "AbstractText": body.get("AbstractText"),
                "AbstractURL": body.get("AbstractURL"),
                "AbstractSource": body.get("AbstractSource"),
            }),
        ));
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = body.get(key).and_then(Value::as_array) {
            flatten_topics(items, None, &mut out);
        }
    }

    out
}

fn flatten_topics(items: &[Value], group: Option<&str>, out: &mut Vec<WebSearchSnippet>) {
    for item in items {
        if let Some(nested) = item.get("Topics").and_then(Value::as_array) {
            let name = item.get("Name").and_then(Value::as_str);
            flatten_topics(nested, name.or(group), out);
            continue;
        }

        let text = str_field(item, "Text");
        let url = str_field(item, "FirstURL");
        if text.is_empty() && url.is_empty() {
            continue;
        }

        // "Title - description" is the usual shape of `Text`.
        let title = match text.split_once(" - ") {
            Some((head, _)) => head.to_string(),
            None => first_non_empty(&[title_from_url(&url), group.unwrap_or("").to_string()]),
        };

        out.push(WebSearchSnippet::new(
            title,
            url,
            text,
            SearchSource::DuckDuckGo,
            item.clone(),
        ));
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

fn first_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .find(|c| !c.trim().is_empty())
        .cloned()
        .unwrap_or_default()
}

/// `https://duckduckgo.com/Some_Topic` → `Some Topic`.
fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|seg| !seg.contains('.') && !seg.is_empty())
        .map(|seg| seg.replace('_', " "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PLACEHOLDER_URL;

    fn fixture() -> Value {
        serde_json::json!({
            "Heading": "Dune",
            "AbstractText": "Dune is a 1965 science fiction novel by Frank Herbert.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Dune_(novel)",
            "AbstractSource": "Wikipedia",
            "Results": [],
            "RelatedTopics": [
                {
                    "Text": "Frank Herbert - American science fiction author.",
                    "FirstURL": "https://duckduckgo.com/Frank_Herbert"
                },
                {
                    "Name": "Adaptations",
                    "Topics": [
                        {
                            "Text": "Dune (1984 film) - Film by David Lynch.",
                            "FirstURL": "https://duckduckgo.com/Dune_(1984_film)"
                        },
                        {
                            "Text": "A miniseries aired in 2000",
                            "FirstURL": "https://duckduckgo.com/Frank_Herberts_Dune"
                        }
                    ]
                },
                {"Icon": {"URL": ""}}
            ]
        })
    }

    #[test]
    fn flattens_abstract_and_nested_topics_in_order() {
        let snippets = normalize(&fixture());
        let titles: Vec<&str> = snippets.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Dune", "Frank Herbert", "Dune (1984 film)", "Frank Herberts Dune"]
        );
        assert!(snippets.iter().all(|s| s.source == SearchSource::DuckDuckGo));
    }

    #[test]
    fn entry_without_url_gets_placeholder() {
        let body = serde_json::json!({
            "RelatedTopics": [{"Text": "Loose text with no link"}]
        });
        let snippets = normalize(&body);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].url, PLACEHOLDER_URL);
        assert!(!snippets[0].title.is_empty());
    }

    #[test]
    fn group_name_used_when_nothing_else_fits() {
        let body = serde_json::json!({
            "RelatedTopics": [
                {"Name": "Novels", "Topics": [{"Text": "", "FirstURL": "https://example.com/page.html"}]}
            ]
        });
        let snippets = normalize(&body);
        assert_eq!(snippets[0].title, "Novels");
    }

    #[test]
    fn empty_body_yields_nothing() {
        assert!(normalize(&serde_json::json!({})).is_empty());
        assert!(normalize(&serde_json::json!({"AbstractText": ""})).is_empty());
    }

    #[test]
    fn title_from_url_uses_last_segment() {
        assert_eq!(title_from_url("https://duckduckgo.com/Some_Topic"), "Some Topic");
        assert_eq!(title_from_url("https://example.com/page.html"), "");
    }
}
