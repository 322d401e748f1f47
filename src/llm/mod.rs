//! Text generation for Book Assist.
//!
//! The [`LlmProvider`] trait is the seam between the workflow and the
//! network. Configuration travels with every call, because the endpoint and
//! model for a chat turn may come from retrieval metadata rather than from
//! process defaults.

pub mod config;
pub mod json;
pub mod openai;

pub use config::{
    EnvLookup, LlmConfig, LlmConfigHint, LlmDefaults, LlmOverrides, extract_hint, process_env,
    resolve_llm_config,
};
pub use openai::OpenAiCompatibleProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
}

/// A text generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs and errors.
    fn name(&self) -> &str;

    /// Run one completion. No retries; the caller decides.
    async fn complete(
        &self,
        config: &LlmConfig,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError>;
}

/// Generate text from a system prompt and a user prompt.
pub async fn generate(
    provider: &dyn LlmProvider,
    config: &LlmConfig,
    system: &str,
    prompt: &str,
) -> Result<String, LlmError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(system),
        ChatMessage::user(prompt),
    ]);
    let response = provider.complete(config, request).await?;
    Ok(response.content)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");

        let parsed: ChatMessage =
            serde_json::from_str(r#"{"role": "tool", "content": "x"}"#).unwrap();
        assert_eq!(parsed.role, Role::Tool);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_str::<ChatMessage>(r#"{"role": "robot", "content": "x"}"#);
        assert!(parsed.is_err());
    }
}
