//! Configuration types.
//!
//! Everything is read from environment-style key/value pairs. `from_env`
//! reads the process environment; `from_lookup` takes any lookup so tests
//! don't have to mutate global state.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmDefaults;
use crate::search::duckduckgo::DEFAULT_DUCKDUCKGO_BASE_URL;
use crate::search::enrich::DEFAULT_READER_BASE_URL;
use crate::search::tavily::DEFAULT_TAVILY_BASE_URL;

/// Low-cost model used for intent classification.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";

/// Web search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub tavily_api_key: Option<SecretString>,
    pub tavily_base_url: String,
    pub duckduckgo_base_url: String,
    /// Try the hosted provider before the public fallback.
    pub use_hosted_search: bool,
    /// Fetch full page text for each snippet.
    pub enrich_full_content: bool,
    pub content_reader_base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            tavily_base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
            duckduckgo_base_url: DEFAULT_DUCKDUCKGO_BASE_URL.to_string(),
            use_hosted_search: true,
            enrich_full_content: false,
            content_reader_base_url: DEFAULT_READER_BASE_URL.to_string(),
        }
    }
}

/// Book retrieval service settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmDefaults,
    pub classifier_model: String,
    pub search: SearchConfig,
    pub retrieval: RetrievalConfig,
    pub prompts_dir: PathBuf,
    pub port: u16,
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key/value lookup.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let retrieval_base_url = get("RETRIEVAL_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("RETRIEVAL_BASE_URL".into()))?;

        let defaults = SearchConfig::default();
        let search = SearchConfig {
            tavily_api_key: get("TAVILY_API_KEY").map(SecretString::from),
            tavily_base_url: get("TAVILY_BASE_URL").unwrap_or(defaults.tavily_base_url),
            duckduckgo_base_url: get("DUCKDUCKGO_BASE_URL")
                .unwrap_or(defaults.duckduckgo_base_url),
            use_hosted_search: parse_flag(
                "USE_HOSTED_SEARCH",
                get("USE_HOSTED_SEARCH"),
                defaults.use_hosted_search,
            )?,
            enrich_full_content: parse_flag(
                "ENRICH_FULL_CONTENT",
                get("ENRICH_FULL_CONTENT"),
                defaults.enrich_full_content,
            )?,
            content_reader_base_url: get("CONTENT_READER_BASE_URL")
                .unwrap_or(defaults.content_reader_base_url),
        };

        let port = match get("BOOK_ASSIST_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "BOOK_ASSIST_PORT".into(),
                message: e.to_string(),
            })?,
            None => 8080,
        };

        Ok(Self {
            llm: LlmDefaults::from_lookup(lookup)?,
            classifier_model: get("CLASSIFIER_MODEL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            search,
            retrieval: RetrievalConfig {
                base_url: retrieval_base_url,
                api_key: get("RETRIEVAL_API_KEY").map(SecretString::from),
            },
            prompts_dir: get("PROMPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./prompts")),
            port,
        })
    }
}

/// Parse a boolean toggle (`1/true/yes/on`, `0/false/no/off`).
fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
