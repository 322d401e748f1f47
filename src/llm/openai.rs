//! OpenAI-compatible chat completions over reqwest.
//!
//! Works with any endpoint exposing `POST {base_url}/chat/completions`
//! (OpenAI, DeepSeek, Moonshot, OpenRouter, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmConfig, LlmProvider};
use crate::error::LlmError;

/// Default per-call network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const PROVIDER: &str = "openai-compatible";

/// Generation client for OpenAI-compatible endpoints.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for OpenAiCompatibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        config: &LlmConfig,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionBody {
            model: &config.model,
            messages: &request.messages,
            temperature: config.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        debug!(
            model = %config.model,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let resp = self
            .client
            .post(completions_url(&config.base_url))
            .bearer_auth(config.api_key.expose_secret())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: PROVIDER.into(),
                        timeout: self.timeout,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %config.model, "Chat completion failed");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
                    provider: PROVIDER.into(),
                },
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                    provider: PROVIDER.into(),
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER.into(),
                    reason: format!("HTTP {status}: {}", truncate(&text, 500)),
                },
            });
        }

        let reply: ChatCompletionReply = resp.json().await.map_err(|e| {
            LlmError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            }
        })?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: "response has no message content".into(),
            })?;

        Ok(CompletionResponse {
            content,
            model: config.model.clone(),
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
