//! HTTP boundary.
//!
//! Thin JSON routes over the intent classifier and research workflow. Handlers
//! validate input, call the core, and translate errors to status codes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::error::WorkflowError;
use crate::intent::{ChatMode, IntentClassificationResult, IntentClassifier, RouteDecision};
use crate::llm::{ChatMessage, LlmOverrides};
use crate::workflow::{ChatWorkflowContext, ResearchWorkflow};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<IntentClassifier>,
    pub workflow: Arc<ResearchWorkflow>,
}

/// Build the Axum router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/intent", post(classify_intent))
        .route("/api/research/draft", post(research_draft))
        .route("/api/research/deep", post(research_deep))
        .route("/api/chat/context", post(chat_context))
        .route("/api/chat/recommend", post(chat_recommend))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "book-assist"
    }))
}

// ── Errors ──────────────────────────────────────────────────────────

/// Workflow error rendered as `{"error": ...}` with a matching status.
pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WorkflowError::InvalidInput(_)
            | WorkflowError::NoUserMessage
            | WorkflowError::MissingDraft => StatusCode::BAD_REQUEST,
            WorkflowError::EmptyRetrieval { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::Llm(_) | WorkflowError::Retrieval(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Config(_) | WorkflowError::Prompt(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

// ── Intent ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentRequest {
    content: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
    /// Unknown mode strings count as no previous mode.
    #[serde(default)]
    previous_mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    bypassed: bool,
    mode: Option<ChatMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification: Option<IntentClassificationResult>,
}

async fn classify_intent(
    State(state): State<AppState>,
    Json(body): Json<IntentRequest>,
) -> impl IntoResponse {
    let previous_mode = body
        .previous_mode
        .as_deref()
        .and_then(|m| m.parse::<ChatMode>().ok());
    let decision = state
        .classifier
        .route(&body.content, &body.history, previous_mode)
        .await;

    let response = match decision {
        RouteDecision::Bypassed(mode) => IntentResponse {
            bypassed: true,
            mode: Some(mode),
            classification: None,
        },
        RouteDecision::Classified(result) => IntentResponse {
            bypassed: false,
            mode: result.intent.chat_mode(),
            classification: Some(result),
        },
    };
    Json(response)
}

// ── Research ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchRequest {
    user_input: String,
}

async fn research_draft(
    State(state): State<AppState>,
    Json(body): Json<ResearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.workflow.run_draft_workflow(&body.user_input).await?;
    Ok(Json(result))
}

async fn research_deep(
    State(state): State<AppState>,
    Json(body): Json<ResearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.workflow.run_deep_research(&body.user_input).await?;
    Ok(Json(result))
}

// ── Chat ────────────────────────────────────────────────────────────

/// Per-request LLM overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverridesBody {
    #[serde(default, alias = "baseURL")]
    base_url: Option<String>,
    #[serde(default)]
    api_key: Option<SecretString>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

impl From<OverridesBody> for LlmOverrides {
    fn from(body: OverridesBody) -> Self {
        LlmOverrides {
            base_url: body.base_url,
            api_key: body.api_key,
            model: body.model,
            temperature: body.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    mode: ChatMode,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    draft_markdown: Option<String>,
    #[serde(default)]
    deep_metadata: Option<Value>,
    #[serde(default)]
    llm_overrides: Option<OverridesBody>,
}

/// Chat context without the API key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatContextView {
    mode: ChatMode,
    system_prompt: String,
    context_plain_text: String,
    metadata: Value,
    model: String,
    base_url: String,
}

impl From<&ChatWorkflowContext> for ChatContextView {
    fn from(ctx: &ChatWorkflowContext) -> Self {
        Self {
            mode: ctx.mode,
            system_prompt: ctx.system_prompt.clone(),
            context_plain_text: ctx.context_plain_text.clone(),
            metadata: ctx.metadata.clone(),
            model: ctx.llm_config.model.clone(),
            base_url: ctx.llm_config.base_url.clone(),
        }
    }
}

async fn prepare_chat(
    state: &AppState,
    body: ChatRequest,
) -> Result<(ChatWorkflowContext, Vec<ChatMessage>), WorkflowError> {
    let overrides: LlmOverrides = body.llm_overrides.unwrap_or_default().into();
    let context = state
        .workflow
        .build_chat_workflow_context(
            body.mode,
            &body.messages,
            body.draft_markdown.as_deref(),
            body.deep_metadata.as_ref(),
            &overrides,
        )
        .await?;
    Ok((context, body.messages))
}

async fn chat_context(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (context, _) = prepare_chat(&state, body).await?;
    Ok(Json(ChatContextView::from(&context)))
}

async fn chat_recommend(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (context, messages) = prepare_chat(&state, body).await?;
    let reply = state
        .workflow
        .generate_recommendation(&context, &messages)
        .await?;
    Ok(Json(json!({
        "reply": reply,
        "mode": context.mode,
        "contextPlainText": context.context_plain_text,
        "metadata": context.metadata,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, LlmError};

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            ApiError(WorkflowError::MissingDraft).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(WorkflowError::NoUserMessage).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(WorkflowError::EmptyRetrieval {
                mode: "text".into()
            })
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn upstream_and_config_errors_map_to_5xx() {
        let llm = WorkflowError::Llm(LlmError::RateLimited {
            provider: "openai".into(),
        });
        assert_eq!(ApiError(llm).status(), StatusCode::BAD_GATEWAY);

        let cfg = WorkflowError::Config(ConfigError::IncompleteLlmConfig {
            missing: vec!["apiKey"],
        });
        assert_eq!(ApiError(cfg).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn chat_request_accepts_camel_case_fields() {
        let body: ChatRequest = serde_json::from_value(json!({
            "mode": "deep",
            "messages": [{"role": "user", "content": "hi"}],
            "draftMarkdown": "# d",
            "llmOverrides": {"baseURL": "https://x/v1", "model": "m"}
        }))
        .unwrap();
        assert_eq!(body.mode, ChatMode::Deep);
        assert_eq!(body.draft_markdown.as_deref(), Some("# d"));
        let overrides: LlmOverrides = body.llm_overrides.unwrap().into();
        assert_eq!(overrides.base_url.as_deref(), Some("https://x/v1"));
        assert_eq!(overrides.model.as_deref(), Some("m"));
    }

    #[test]
    fn unknown_chat_mode_is_rejected() {
        let body = serde_json::from_value::<ChatRequest>(json!({
            "mode": "research",
            "messages": []
        }));
        assert!(body.is_err());
    }
}
