//! Research workflow orchestration.
//!
//! Chains the prompt store, generation client, web search, and book
//! retrieval into the research entry points:
//! - [`ResearchWorkflow::generate_keywords`] (keywords.rs)
//! - [`ResearchWorkflow::run_draft_workflow`] and
//!   [`ResearchWorkflow::run_deep_research`] (draft.rs)
//! - [`ResearchWorkflow::build_chat_workflow_context`] and
//!   [`ResearchWorkflow::generate_recommendation`] (chat.rs)
//!
//! Steps run sequentially. No step is retried.

pub mod chat;
pub mod draft;
pub mod keywords;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WorkflowError};
use crate::intent::ChatMode;
use crate::llm::{
    EnvLookup, LlmConfig, LlmConfigHint, LlmDefaults, LlmOverrides, LlmProvider,
    resolve_llm_config,
};
use crate::prompts::PromptStore;
use crate::retrieval::{BookRetriever, RetrievalResult};
use crate::search::{WebSearchClient, WebSearchSnippet};

/// Tunables for the workflow. Defaults match the retrieval service's expectations.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Web results fetched per research query.
    pub draft_search_top_k: usize,
    /// Books requested in text mode.
    pub text_top_k: usize,
    pub per_query_top_k: usize,
    pub final_top_k: usize,
    pub enable_rerank: bool,
    /// Upper bound on generated keywords.
    pub max_keywords: usize,
    /// Conversation messages forwarded to the recommendation call.
    pub recommendation_history: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            draft_search_top_k: 5,
            text_top_k: 8,
            per_query_top_k: 5,
            final_top_k: 10,
            enable_rerank: true,
            max_keywords: 3,
            recommendation_history: 12,
        }
    }
}

/// Keyword importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPriority {
    High,
    Medium,
    Low,
}

impl KeywordPriority {
    /// Unrecognized labels become `Medium`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" | "高" => KeywordPriority::High,
            "low" | "低" => KeywordPriority::Low,
            _ => KeywordPriority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordPriority::High => "high",
            KeywordPriority::Medium => "medium",
            KeywordPriority::Low => "low",
        }
    }
}

impl fmt::Display for KeywordPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One research keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordResult {
    pub keyword: String,
    pub reason: String,
    pub priority: KeywordPriority,
}

/// Output of the single-query research flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftWorkflowResult {
    pub user_input: String,
    pub search_snippets: Vec<WebSearchSnippet>,
    pub article_analysis: String,
    pub cross_analysis: String,
    pub draft_markdown: String,
}

/// Search and analysis for one keyword of a deep research run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordResearch {
    pub keyword: KeywordResult,
    pub snippets: Vec<WebSearchSnippet>,
    pub analysis: String,
}

/// Output of the multi-keyword research pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepResearchResult {
    pub user_input: String,
    pub keywords: Vec<KeywordResult>,
    pub per_keyword: Vec<KeywordResearch>,
    pub cross_analysis: String,
    pub draft_markdown: String,
    pub retrieval: RetrievalResult,
}

/// Everything the recommendation step needs for one chat turn.
///
/// Not serializable: `llm_config` carries the API key.
#[derive(Debug, Clone)]
pub struct ChatWorkflowContext {
    pub mode: ChatMode,
    pub system_prompt: String,
    pub context_plain_text: String,
    pub metadata: serde_json::Value,
    pub llm_config: LlmConfig,
}

/// The research orchestrator.
pub struct ResearchWorkflow {
    prompts: Arc<PromptStore>,
    llm: Arc<dyn LlmProvider>,
    search: Arc<WebSearchClient>,
    retriever: Arc<dyn BookRetriever>,
    defaults: LlmDefaults,
    env: EnvLookup,
    settings: WorkflowSettings,
}

impl ResearchWorkflow {
    pub fn new(
        prompts: Arc<PromptStore>,
        llm: Arc<dyn LlmProvider>,
        search: Arc<WebSearchClient>,
        retriever: Arc<dyn BookRetriever>,
        defaults: LlmDefaults,
        env: EnvLookup,
    ) -> Self {
        Self {
            prompts,
            llm,
            search,
            retriever,
            defaults,
            env,
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Layer overrides > hint > defaults for this workflow.
    fn resolve_config(
        &self,
        overrides: &LlmOverrides,
        hint: Option<&LlmConfigHint>,
    ) -> Result<LlmConfig, ConfigError> {
        resolve_llm_config(overrides, hint, &self.defaults, self.env.as_ref())
    }

    /// Process defaults only.
    fn default_config(&self) -> Result<LlmConfig, ConfigError> {
        self.resolve_config(&LlmOverrides::default(), None)
    }
}

/// Reject blank input before any external call.
fn require_input(user_input: &str) -> Result<&str, WorkflowError> {
    let trimmed = user_input.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidInput("user input is empty".into()));
    }
    Ok(trimmed)
}
