//! Chat turn preparation and recommendation.
//!
//! A chat turn is grounded in retrieved book context. Retrieval with no
//! context text is a hard failure because the recommendation prompt
//! assumes grounded material.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ChatWorkflowContext, ResearchWorkflow};
use crate::error::WorkflowError;
use crate::intent::ChatMode;
use crate::llm::{ChatMessage, CompletionRequest, LlmOverrides, Role, extract_hint};
use crate::prompts::PromptName;
use crate::retrieval::{MultiQueryRequest, TextSearchRequest};

/// Metadata keys that may carry a research draft.
const DRAFT_KEYS: &[&str] = &["draftMarkdown", "draft_markdown"];

impl ResearchWorkflow {
    /// Prepare the system prompt, retrieval context, and LLM config for a chat turn.
    pub async fn build_chat_workflow_context(
        &self,
        mode: ChatMode,
        messages: &[ChatMessage],
        draft_markdown: Option<&str>,
        deep_metadata: Option<&Value>,
        overrides: &LlmOverrides,
    ) -> Result<ChatWorkflowContext, WorkflowError> {
        let user_input = latest_user_message(messages).ok_or(WorkflowError::NoUserMessage)?;
        let draft = resolve_draft(draft_markdown, deep_metadata);

        if mode == ChatMode::Deep && draft.is_empty() {
            warn!(user_input = %user_input, "Deep chat turn without a research draft");
            return Err(WorkflowError::MissingDraft);
        }

        let retrieval = match mode {
            ChatMode::Text => {
                self.retriever
                    .text_search(TextSearchRequest::new(user_input, self.settings.text_top_k))
                    .await?
            }
            ChatMode::Deep => {
                self.retriever
                    .multi_query(MultiQueryRequest {
                        markdown: draft.clone(),
                        per_query_top_k: self.settings.per_query_top_k,
                        final_top_k: self.settings.final_top_k,
                        enable_rerank: self.settings.enable_rerank,
                        filters: None,
                    })
                    .await?
            }
        };

        if !retrieval.has_context() {
            warn!(
                mode = %mode,
                user_input = %user_input,
                books = retrieval.books().len(),
                "Retrieval returned no context text"
            );
            return Err(WorkflowError::EmptyRetrieval {
                mode: mode.to_string(),
            });
        }

        let base = self.prompts.load_prompt(PromptName::Recommendation).await?;
        let system_prompt =
            compose_system_prompt(&base, user_input, &retrieval.context_plain_text, &draft);

        let hint = extract_hint(&retrieval.metadata);
        if hint.is_some() {
            debug!("Retrieval metadata carries an LLM config hint");
        }
        let llm_config = self.resolve_config(overrides, hint.as_ref())?;

        info!(
            mode = %mode,
            context_chars = retrieval.context_plain_text.chars().count(),
            model = %llm_config.model,
            "Chat context ready"
        );

        Ok(ChatWorkflowContext {
            mode,
            system_prompt,
            context_plain_text: retrieval.context_plain_text,
            metadata: retrieval.metadata,
            llm_config,
        })
    }

    /// Generate the recommendation reply for a prepared chat turn.
    pub async fn generate_recommendation(
        &self,
        context: &ChatWorkflowContext,
        messages: &[ChatMessage],
    ) -> Result<String, WorkflowError> {
        let conversation: Vec<&ChatMessage> =
            messages.iter().filter(|m| m.role != Role::System).collect();
        if !conversation.iter().any(|m| m.role == Role::User) {
            return Err(WorkflowError::NoUserMessage);
        }

        let start = conversation
            .len()
            .saturating_sub(self.settings.recommendation_history);
        let mut request_messages = Vec::with_capacity(conversation.len() - start + 1);
        request_messages.push(ChatMessage::system(context.system_prompt.clone()));
        request_messages.extend(conversation[start..].iter().map(|m| (*m).clone()));

        let response = self
            .llm
            .complete(&context.llm_config, CompletionRequest::new(request_messages))
            .await?;

        info!(
            mode = %context.mode,
            model = %response.model,
            reply_chars = response.content.chars().count(),
            "Recommendation generated"
        );
        Ok(response.content)
    }
}

/// Most recent user message with non-blank content.
fn latest_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .find(|c| !c.is_empty())
}

/// Explicit draft, else the one carried in deep-research metadata, else empty.
fn resolve_draft(explicit: Option<&str>, deep_metadata: Option<&Value>) -> String {
    explicit
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .or_else(|| {
            let metadata = deep_metadata?;
            DRAFT_KEYS
                .iter()
                .find_map(|k| metadata.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|d| !d.is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

fn compose_system_prompt(base: &str, user_input: &str, context: &str, draft: &str) -> String {
    let mut prompt = format!(
        "{}\n\n## 对话背景\n{}\n\n## 检索结果\n{}",
        base.trim_end(),
        user_input,
        context.trim()
    );
    if !draft.is_empty() {
        prompt.push_str("\n\n## 调研草稿\n");
        prompt.push_str(draft);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;

    use super::*;
    use crate::llm::LlmDefaults;
    use crate::llm::mock::{ScriptedLlm, no_env};
    use crate::prompts::PromptStore;
    use crate::prompts::tests::CountingSource;
    use crate::workflow::tests::{StubRetriever, stub_search, workflow};

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("ignored"),
            ChatMessage::user("推荐几本科幻小说"),
            ChatMessage::assistant("好的"),
            ChatMessage::user("  要适合入门的  "),
        ]
    }

    // ── Helper tests ────────────────────────────────────────────────

    #[test]
    fn latest_user_message_scans_from_end() {
        assert_eq!(latest_user_message(&history()), Some("要适合入门的"));
        assert_eq!(
            latest_user_message(&[ChatMessage::assistant("hi"), ChatMessage::system("s")]),
            None
        );
    }

    #[test]
    fn draft_resolution_order() {
        let meta = json!({"draftMarkdown": "from meta"});
        assert_eq!(resolve_draft(Some("explicit"), Some(&meta)), "explicit");
        assert_eq!(resolve_draft(Some("   "), Some(&meta)), "from meta");
        assert_eq!(
            resolve_draft(None, Some(&json!({"draft_markdown": "snake"}))),
            "snake"
        );
        assert_eq!(resolve_draft(None, Some(&json!({"draftMarkdown": 7}))), "");
        assert_eq!(resolve_draft(None, None), "");
    }

    #[test]
    fn system_prompt_sections() {
        let with_draft = compose_system_prompt("BASE\n", "q", "ctx", "# draft");
        assert_eq!(
            with_draft,
            "BASE\n\n## 对话背景\nq\n\n## 检索结果\nctx\n\n## 调研草稿\n# draft"
        );
        let without = compose_system_prompt("BASE", "q", "ctx", "");
        assert!(!without.contains("## 调研草稿"));
    }

    // ── Context building ────────────────────────────────────────────

    #[tokio::test]
    async fn text_mode_searches_latest_user_input() {
        let retriever = StubRetriever::returning("《三体》刘慈欣", json!({"books": [1]}));
        let wf = workflow(ScriptedLlm::new(vec![]), retriever.clone());

        let ctx = wf
            .build_chat_workflow_context(
                ChatMode::Text,
                &history(),
                None,
                None,
                &LlmOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(ctx.mode, ChatMode::Text);
        assert_eq!(ctx.context_plain_text, "《三体》刘慈欣");
        assert!(ctx.system_prompt.starts_with("recommendation:base"));
        assert!(ctx.system_prompt.contains("## 对话背景\n要适合入门的"));
        assert!(ctx.system_prompt.contains("## 检索结果\n《三体》刘慈欣"));
        assert_eq!(ctx.llm_config.model, "default-model");

        let requests = retriever.text_requests.lock().unwrap();
        assert_eq!(requests[0].query, "要适合入门的");
        assert_eq!(requests[0].top_k, 8);
        assert_eq!(retriever.multi_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deep_mode_uses_draft_from_metadata() {
        let retriever = StubRetriever::returning("ctx", json!({}));
        let wf = workflow(ScriptedLlm::new(vec![]), retriever.clone());
        let meta = json!({"draftMarkdown": "## 研究草稿\n- 硬科幻"});

        let ctx = wf
            .build_chat_workflow_context(
                ChatMode::Deep,
                &history(),
                None,
                Some(&meta),
                &LlmOverrides::default(),
            )
            .await
            .unwrap();

        assert!(ctx.system_prompt.ends_with("## 调研草稿\n## 研究草稿\n- 硬科幻"));
        let requests = retriever.multi_requests.lock().unwrap();
        assert_eq!(requests[0].markdown, "## 研究草稿\n- 硬科幻");
        assert_eq!(requests[0].per_query_top_k, 5);
        assert_eq!(requests[0].final_top_k, 10);
        assert!(requests[0].enable_rerank);
    }

    #[tokio::test]
    async fn deep_mode_without_draft_fails_before_retrieval() {
        let retriever = StubRetriever::returning("ctx", json!({}));
        let wf = workflow(ScriptedLlm::new(vec![]), retriever.clone());

        let err = wf
            .build_chat_workflow_context(
                ChatMode::Deep,
                &history(),
                Some("   "),
                Some(&json!({})),
                &LlmOverrides::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::MissingDraft));
        assert_eq!(retriever.total_calls(), 0);
    }

    #[tokio::test]
    async fn no_user_message_fails_before_retrieval() {
        let retriever = StubRetriever::returning("ctx", json!({}));
        let wf = workflow(ScriptedLlm::new(vec![]), retriever.clone());

        let err = wf
            .build_chat_workflow_context(
                ChatMode::Text,
                &[ChatMessage::assistant("hello")],
                None,
                None,
                &LlmOverrides::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::NoUserMessage));
        assert_eq!(retriever.total_calls(), 0);
    }

    #[tokio::test]
    async fn empty_context_fails_even_with_books() {
        let retriever = StubRetriever::returning("  ", json!({"books": [{"title": "Dune"}]}));
        let wf = workflow(ScriptedLlm::new(vec![]), retriever);

        let err = wf
            .build_chat_workflow_context(
                ChatMode::Text,
                &history(),
                None,
                None,
                &LlmOverrides::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::EmptyRetrieval { ref mode } if mode == "text"));
    }

    #[tokio::test]
    async fn retrieval_hint_and_overrides_layer_over_defaults() {
        let retriever = StubRetriever::returning(
            "ctx",
            json!({"llm_config": {"baseURL": "https://hint.example/v1", "model": "hint-model", "apiKeyEnv": "BOOK_LLM_KEY"}}),
        );
        let env: crate::llm::EnvLookup = std::sync::Arc::new(|key: &str| {
            (key == "BOOK_LLM_KEY").then(|| "env-key".to_string())
        });
        let wf = ResearchWorkflow::new(
            PromptStore::new(CountingSource::new("base")),
            ScriptedLlm::new(vec![]),
            stub_search(&[]),
            retriever,
            LlmDefaults::default(),
            env,
        );
        let overrides = LlmOverrides {
            model: Some("override-model".into()),
            ..Default::default()
        };

        let ctx = wf
            .build_chat_workflow_context(ChatMode::Text, &history(), None, None, &overrides)
            .await
            .unwrap();

        assert_eq!(ctx.llm_config.base_url, "https://hint.example/v1");
        assert_eq!(ctx.llm_config.model, "override-model");
        assert_eq!(ctx.llm_config.api_key.expose_secret(), "env-key");
    }

    #[tokio::test]
    async fn unresolved_llm_config_is_fatal() {
        let wf = ResearchWorkflow::new(
            PromptStore::new(CountingSource::new("base")),
            ScriptedLlm::new(vec![]),
            stub_search(&[]),
            StubRetriever::returning("ctx", json!({"llmConfig": {"model": "m"}})),
            LlmDefaults::default(),
            no_env(),
        );

        let err = wf
            .build_chat_workflow_context(
                ChatMode::Text,
                &history(),
                None,
                None,
                &LlmOverrides::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Config(_)));
    }

    // ── Recommendation ──────────────────────────────────────────────

    fn prepared_context() -> ChatWorkflowContext {
        ChatWorkflowContext {
            mode: ChatMode::Text,
            system_prompt: "SYSTEM".into(),
            context_plain_text: "ctx".into(),
            metadata: json!({}),
            llm_config: crate::llm::LlmConfig {
                base_url: "https://hint.example/v1".into(),
                api_key: SecretString::from("k"),
                model: "reco-model".into(),
                temperature: Some(0.4),
            },
        }
    }

    #[tokio::test]
    async fn recommendation_sends_system_prompt_and_recent_turns() {
        let llm = ScriptedLlm::new(vec![Ok("推荐《三体》")]);
        let wf = workflow(llm.clone(), StubRetriever::returning("", json!({})));

        let mut messages = vec![ChatMessage::system("client system message")];
        for i in 0..20 {
            messages.push(ChatMessage::user(format!("u{i}")));
        }

        let reply = wf
            .generate_recommendation(&prepared_context(), &messages)
            .await
            .unwrap();
        assert_eq!(reply, "推荐《三体》");

        let requests = llm.requests.lock().unwrap();
        let (config, request) = &requests[0];
        assert_eq!(config.model, "reco-model");
        assert_eq!(request.messages.len(), 13);
        assert_eq!(request.messages[0], ChatMessage::system("SYSTEM"));
        assert_eq!(request.messages[1].content, "u8");
        assert_eq!(request.messages[12].content, "u19");
    }

    #[tokio::test]
    async fn recommendation_requires_a_user_message() {
        let llm = ScriptedLlm::new(vec![]);
        let wf = workflow(llm.clone(), StubRetriever::returning("", json!({})));

        let err = wf
            .generate_recommendation(&prepared_context(), &[ChatMessage::system("s")])
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NoUserMessage));
        assert_eq!(llm.call_count(), 0);
    }
}
