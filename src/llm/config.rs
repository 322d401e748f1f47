//! LLM configuration resolution.
//!
//! A request's final configuration is layered from three sources, highest
//! priority first:
//! 1. Explicit overrides supplied by the caller
//! 2. A hint embedded in retrieval metadata (direct value, or the name of an
//!    environment variable holding it)
//! 3. Process-wide defaults read from the environment at startup
//!
//! An incomplete result (no base URL, key, or model) is always an error.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Environment lookup used for defaults and `*Env` hint indirection.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the real process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok())
}

/// Metadata keys that may carry an LLM configuration hint.
const HINT_KEYS: &[&str] = &["llmConfig", "llm_config"];

/// Fully resolved configuration for one generation call.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: Option<f32>,
}

impl LlmConfig {
    /// Copy of this config with the temperature replaced.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Process-wide defaults (`LLM_BASE_URL`, `LLM_API_KEY`, `LLM_MODEL`, `LLM_TEMPERATURE`).
#[derive(Debug, Clone, Default)]
pub struct LlmDefaults {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl LlmDefaults {
    /// Read defaults through an environment lookup.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let temperature = match non_empty(lookup("LLM_TEMPERATURE")) {
            Some(raw) => Some(raw.parse::<f32>().map_err(|e| ConfigError::InvalidValue {
                key: "LLM_TEMPERATURE".into(),
                message: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            base_url: non_empty(lookup("LLM_BASE_URL")),
            api_key: non_empty(lookup("LLM_API_KEY")).map(SecretString::from),
            model: non_empty(lookup("LLM_MODEL")),
            temperature,
        })
    }
}

/// Caller-supplied values that win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct LlmOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Configuration hint embedded in retrieval metadata.
///
/// Each value may be given directly or as the name of an environment
/// variable holding it; the direct value wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfigHint {
    #[serde(default, alias = "baseURL", alias = "base_url")]
    pub base_url: Option<String>,
    #[serde(default, alias = "baseURLEnv", alias = "base_url_env")]
    pub base_url_env: Option<String>,
    #[serde(default, alias = "api_key")]
    pub api_key: Option<String>,
    #[serde(default, alias = "api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "model_env")]
    pub model_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl LlmConfigHint {
    fn value(
        direct: &Option<String>,
        env_name: &Option<String>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Option<String> {
        non_empty(direct.clone()).or_else(|| {
            let name = non_empty(env_name.clone())?;
            let resolved = non_empty(lookup(&name));
            if resolved.is_none() {
                debug!(env = %name, "LLM hint references an unset environment variable");
            }
            resolved
        })
    }
}

/// Pull an LLM configuration hint out of retrieval metadata, if any.
///
/// A malformed hint is logged and ignored.
pub fn extract_hint(metadata: &serde_json::Value) -> Option<LlmConfigHint> {
    let raw = HINT_KEYS.iter().find_map(|key| metadata.get(*key))?;
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value::<LlmConfigHint>(raw.clone()) {
        Ok(hint) => Some(hint),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed LLM config hint in retrieval metadata");
            None
        }
    }
}

/// Layer overrides > hint > defaults into a complete [`LlmConfig`].
pub fn resolve_llm_config(
    overrides: &LlmOverrides,
    hint: Option<&LlmConfigHint>,
    defaults: &LlmDefaults,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<LlmConfig, ConfigError> {
    let base_url = non_empty(overrides.base_url.clone())
        .or_else(|| hint.and_then(|h| LlmConfigHint::value(&h.base_url, &h.base_url_env, lookup)))
        .or_else(|| non_empty(defaults.base_url.clone()));

    let api_key = overrides
        .api_key
        .clone()
        .filter(|k| !k.expose_secret().trim().is_empty())
        .or_else(|| {
            hint.and_then(|h| LlmConfigHint::value(&h.api_key, &h.api_key_env, lookup))
                .map(SecretString::from)
        })
        .or_else(|| {
            defaults
                .api_key
                .clone()
                .filter(|k| !k.expose_secret().trim().is_empty())
        });

    let model = non_empty(overrides.model.clone())
        .or_else(|| hint.and_then(|h| LlmConfigHint::value(&h.model, &h.model_env, lookup)))
        .or_else(|| non_empty(defaults.model.clone()));

    let temperature = overrides
        .temperature
        .or_else(|| hint.and_then(|h| h.temperature))
        .or(defaults.temperature);

    match (base_url, api_key, model) {
        (Some(base_url), Some(api_key), Some(model)) => Ok(LlmConfig {
            base_url,
            api_key,
            model,
            temperature,
        }),
        (base_url, api_key, model) => {
            let mut missing = Vec::new();
            if base_url.is_none() {
                missing.push("baseURL");
            }
            if api_key.is_none() {
                missing.push("apiKey");
            }
            if model.is_none() {
                missing.push("model");
            }
            Err(ConfigError::IncompleteLlmConfig { missing })
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
