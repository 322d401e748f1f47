//! Intent classification: decides how a chat turn should be handled.
//!
//! Flow:
//! 1. Rules fast path (`rules::should_bypass_classifier`) → may skip the LLM
//! 2. LLM classification → structured JSON decision
//! 3. Any failure → fixed fallback (treat as simple search)
//!
//! Classification never fails a request.

pub mod rules;

pub use rules::{ChatMode, is_greeting, should_bypass_classifier};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::llm::json::extract_json_object;
use crate::llm::{
    ChatMessage, CompletionRequest, EnvLookup, LlmDefaults, LlmOverrides, LlmProvider,
    resolve_llm_config,
};
use crate::prompts::{PromptName, PromptStore};

/// How many history messages go into the classifier request.
pub const HISTORY_WINDOW: usize = 6;

/// Each history message is cut to this many characters.
pub const HISTORY_MESSAGE_MAX_CHARS: usize = 280;

/// Confidence used when the model gives none or a non-numeric one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Max tokens for the classifier call (it runs on every message).
const CLASSIFIER_MAX_TOKENS: u32 = 256;

/// What the user wants from this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SimpleSearch,
    DeepSearch,
    Other,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SimpleSearch => "simple_search",
            Intent::DeepSearch => "deep_search",
            Intent::Other => "other",
        }
    }

    /// Map a model-supplied label onto the closed set. Unknown → simple search.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "simple_search" => Intent::SimpleSearch,
            "deep_search" => Intent::DeepSearch,
            "other" => Intent::Other,
            _ => Intent::SimpleSearch,
        }
    }

    /// Chat mode this intent runs in, if it leads to a search at all.
    pub fn chat_mode(&self) -> Option<ChatMode> {
        match self {
            Intent::SimpleSearch => Some(ChatMode::Text),
            Intent::DeepSearch => Some(ChatMode::Deep),
            Intent::Other => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Llm,
    Rule,
}

/// Outcome of one classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassificationResult {
    pub intent: Intent,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_query: Option<String>,
    pub source: ClassificationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl IntentClassificationResult {
    /// Fixed rule-sourced fallback: simple search, zero confidence.
    pub fn fallback(reason: &str) -> Self {
        Self {
            intent: Intent::SimpleSearch,
            confidence: 0.0,
            reason: Some(reason.to_string()),
            suggested_query: None,
            source: ClassificationSource::Rule,
            raw_output: None,
        }
    }

    fn with_raw_output(mut self, raw: &str) -> Self {
        self.raw_output = Some(raw.to_string());
        self
    }
}

/// Routing decision for a chat turn.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// Previous mode continues; classifier skipped.
    Bypassed(ChatMode),
    /// Classifier ran (possibly falling back).
    Classified(IntentClassificationResult),
}

/// LLM-backed intent classifier.
pub struct IntentClassifier {
    prompts: Arc<PromptStore>,
    llm: Arc<dyn LlmProvider>,
    defaults: LlmDefaults,
    model: String,
    env: EnvLookup,
}

impl IntentClassifier {
    pub fn new(
        prompts: Arc<PromptStore>,
        llm: Arc<dyn LlmProvider>,
        defaults: LlmDefaults,
        model: impl Into<String>,
        env: EnvLookup,
    ) -> Self {
        Self {
            prompts,
            llm,
            defaults,
            model: model.into(),
            env,
        }
    }

    /// Apply the fast path, then classify if needed.
    pub async fn route(
        &self,
        content: &str,
        history: &[ChatMessage],
        previous_mode: Option<ChatMode>,
    ) -> RouteDecision {
        if let Some(mode) = previous_mode
            && should_bypass_classifier(content, previous_mode)
        {
            info!(mode = %mode, "Continuing previous mode without classification");
            return RouteDecision::Bypassed(mode);
        }
        RouteDecision::Classified(self.classify(content, history).await)
    }

    /// Classify a user utterance. Never fails.
    pub async fn classify(
        &self,
        user_input: &str,
        history: &[ChatMessage],
    ) -> IntentClassificationResult {
        let input = user_input.trim();
        if input.is_empty() {
            return IntentClassificationResult::fallback("empty input");
        }

        let system_prompt = match self.prompts.load_prompt(PromptName::QuestionClassification).await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Classifier prompt unavailable, using fallback");
                return IntentClassificationResult::fallback("classifier prompt unavailable");
            }
        };

        let overrides = LlmOverrides {
            model: Some(self.model.clone()),
            temperature: Some(0.0),
            ..Default::default()
        };
        let config = match resolve_llm_config(&overrides, None, &self.defaults, self.env.as_ref()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, model = %self.model, "Classifier LLM config incomplete, using fallback");
                return IntentClassificationResult::fallback("classifier not configured");
            }
        };

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt.as_ref()),
            ChatMessage::user(build_classifier_prompt(input, history)),
        ])
        .with_max_tokens(CLASSIFIER_MAX_TOKENS);

        let raw = match self.llm.complete(&config, request).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(
                    error = %e,
                    provider = self.llm.name(),
                    model = %config.model,
                    "Intent classification call failed, using fallback"
                );
                return IntentClassificationResult::fallback("classifier unavailable");
            }
        };

        match parse_classification(&raw) {
            Ok(result) => {
                debug!(
                    intent = %result.intent,
                    confidence = result.confidence,
                    "Intent classified"
                );
                result
            }
            Err(e) => {
                warn!(raw_response = %raw, error = %e, "Failed to parse classifier output, using fallback");
                IntentClassificationResult::fallback("classifier output unparseable").with_raw_output(&raw)
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Build the classifier user prompt: recent history, then the current input.
pub fn build_classifier_prompt(input: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::with_capacity(512);

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let recent = &history[start..];
    if !recent.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for msg in recent {
            let content = truncate_chars(&collapse_whitespace(&msg.content), HISTORY_MESSAGE_MAX_CHARS);
            prompt.push_str(&format!("[{}] {}\n", msg.role.as_str(), content));
        }
        prompt.push('\n');
    }

    prompt.push_str("Current input:\n");
    prompt.push_str(input);
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse classifier output into a normalized, LLM-sourced result.
fn parse_classification(raw: &str) -> Result<IntentClassificationResult, String> {
    let json_str = extract_json_object(raw);
    let value: Value =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    let obj = value
        .as_object()
        .ok_or_else(|| "classifier output is not a JSON object".to_string())?;

    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::normalize)
        .unwrap_or(Intent::SimpleSearch);

    let confidence = normalize_confidence(obj.get("confidence"));

    let text_field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(IntentClassificationResult {
        intent,
        confidence,
        reason: text_field(&["reason"]),
        suggested_query: text_field(&["suggested_query", "suggestedQuery"]),
        source: ClassificationSource::Llm,
        raw_output: Some(raw.to_string()),
    })
}

/// Numeric (or numeric-string) confidence clipped into [0, 1]; anything else → 0.5.
fn normalize_confidence(value: Option<&Value>) -> f32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0) as f32,
        _ => DEFAULT_CONFIDENCE,
    }
}
