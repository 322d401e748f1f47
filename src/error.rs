//! Error types for Book Assist.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Incomplete LLM configuration, unresolved: {}", missing.join(", "))]
    IncompleteLlmConfig { missing: Vec<&'static str> },
}

/// Generation provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Web search provider errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search provider {provider} is missing credential {key}")]
    MissingCredential { provider: String, key: String },

    #[error("Search provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Search provider {provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Search provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Search provider {provider} returned a malformed body: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Book retrieval service errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Retrieval {operation} returned status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Retrieval {operation} request failed: {reason}")]
    RequestFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Retrieval {operation} returned a malformed body: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

/// Prompt storage errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt {name} not found at {location}")]
    NotFound { name: String, location: String },

    #[error("Failed to read prompt {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Research workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No user message found in conversation history")]
    NoUserMessage,

    #[error("Deep mode requires a draft, but none was provided")]
    MissingDraft,

    #[error("Retrieval for {mode} mode returned no context")]
    EmptyRetrieval { mode: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
