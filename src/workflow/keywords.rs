//! Keyword generation for deep research.
//!
//! The model is asked for a JSON array of `{keyword, reason, priority}`.
//! Output that cannot be parsed, or parses to nothing usable, degrades to
//! one keyword equal to the user input.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{KeywordPriority, KeywordResult, ResearchWorkflow, require_input};
use crate::error::WorkflowError;
use crate::llm::generate;
use crate::llm::json::{extract_json_array, extract_json_object, strip_code_fence};
use crate::prompts::PromptName;

impl ResearchWorkflow {
    /// Ask the model for search keywords. Generation failures propagate.
    pub async fn generate_keywords(
        &self,
        user_input: &str,
    ) -> Result<Vec<KeywordResult>, WorkflowError> {
        let input = require_input(user_input)?;
        let config = self.default_config()?;
        let system = self.prompts.load_prompt(PromptName::KeywordGeneration).await?;

        let prompt = format!("用户需求：\n{input}");
        let raw = generate(self.llm.as_ref(), &config, &system, &prompt).await?;

        let keywords = match parse_keywords(&raw, self.settings.max_keywords) {
            Some(keywords) => keywords,
            None => {
                warn!(
                    user_input = %input,
                    raw_response = %raw,
                    "Keyword output unusable, searching on the raw input"
                );
                vec![fallback_keyword(input)]
            }
        };

        info!(
            count = keywords.len(),
            keywords = ?keywords.iter().map(|k| k.keyword.as_str()).collect::<Vec<_>>(),
            "Generated research keywords"
        );
        Ok(keywords)
    }
}

fn fallback_keyword(input: &str) -> KeywordResult {
    KeywordResult {
        keyword: input.to_string(),
        reason: "原始输入".to_string(),
        priority: KeywordPriority::High,
    }
}

/// Parse model output into at most `max` keywords, highest priority first.
///
/// `None` when nothing usable was found.
pub fn parse_keywords(raw: &str, max: usize) -> Option<Vec<KeywordResult>> {
    let items = keyword_items(raw)?;

    let mut keywords: Vec<KeywordResult> = items.iter().filter_map(keyword_from_value).collect();
    if keywords.is_empty() {
        return None;
    }

    // Stable: equal priorities keep the model's order.
    keywords.sort_by_key(|k| k.priority);
    keywords.truncate(max.max(1));
    debug!(count = keywords.len(), "Parsed keyword list");
    Some(keywords)
}

/// The keyword array, either top-level or under `keywords`.
fn keyword_items(raw: &str) -> Option<Vec<Value>> {
    let unfenced = strip_code_fence(raw);

    let candidates = [
        unfenced.to_string(),
        extract_json_array(unfenced),
        extract_json_object(unfenced),
    ];
    let value = candidates
        .iter()
        .find_map(|c| serde_json::from_str::<Value>(c).ok())?;

    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut obj) => match obj.remove("keywords") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn keyword_from_value(item: &Value) -> Option<KeywordResult> {
    match item {
        Value::String(s) => {
            let keyword = s.trim();
            (!keyword.is_empty()).then(|| KeywordResult {
                keyword: keyword.to_string(),
                reason: String::new(),
                priority: KeywordPriority::Medium,
            })
        }
        Value::Object(obj) => {
            let keyword = obj.get("keyword").and_then(Value::as_str)?.trim();
            if keyword.is_empty() {
                return None;
            }
            Some(KeywordResult {
                keyword: keyword.to_string(),
                reason: obj
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                priority: obj
                    .get("priority")
                    .and_then(Value::as_str)
                    .map(KeywordPriority::normalize)
                    .unwrap_or(KeywordPriority::Medium),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;
    use crate::workflow::tests::{StubRetriever, workflow};

    #[test]
    fn parses_plain_array() {
        let raw = r#"[
            {"keyword": "宋代理学", "reason": "核心主题", "priority": "high"},
            {"keyword": "朱熹", "reason": "代表人物", "priority": "medium"}
        ]"#;
        let kws = parse_keywords(raw, 3).unwrap();
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[0].keyword, "宋代理学");
        assert_eq!(kws[0].priority, KeywordPriority::High);
        assert_eq!(kws[1].reason, "代表人物");
    }

    #[test]
    fn parses_fenced_wrapper_object() {
        let raw = "```json\n{\"keywords\": [{\"keyword\": \"dune\", \"priority\": \"low\"}]}\n```";
        let kws = parse_keywords(raw, 3).unwrap();
        assert_eq!(kws[0].keyword, "dune");
        assert_eq!(kws[0].priority, KeywordPriority::Low);
    }

    #[test]
    fn sorts_by_priority_stably_then_caps() {
        let raw = r#"[
            {"keyword": "a", "priority": "low"},
            {"keyword": "b", "priority": "medium"},
            {"keyword": "c", "priority": "high"},
            {"keyword": "d", "priority": "medium"}
        ]"#;
        let kws = parse_keywords(raw, 3).unwrap();
        let names: Vec<_> = kws.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
    }

    #[test]
    fn unknown_priority_is_medium_and_blank_keywords_dropped() {
        let raw = r#"[
            {"keyword": "  ", "priority": "high"},
            {"keyword": "x", "priority": "critical"},
            {"reason": "no keyword"},
            "plain string"
        ]"#;
        let kws = parse_keywords(raw, 5).unwrap();
        assert_eq!(kws.len(), 2);
        assert!(kws.iter().all(|k| k.priority == KeywordPriority::Medium));
        assert_eq!(kws[1].keyword, "plain string");
    }

    #[test]
    fn unusable_output_is_none() {
        assert!(parse_keywords("no json here", 3).is_none());
        assert!(parse_keywords("[]", 3).is_none());
        assert!(parse_keywords(r#"{"other": 1}"#, 3).is_none());
    }

    #[tokio::test]
    async fn parse_failure_falls_back_to_raw_input() {
        let llm = ScriptedLlm::new(vec![Ok("sorry, I can't do JSON today")]);
        let wf = workflow(llm.clone(), StubRetriever::returning("", serde_json::Value::Null));

        let kws = wf.generate_keywords("  科幻小说入门  ").await.unwrap();
        assert_eq!(kws.len(), 1);
        assert_eq!(kws[0].keyword, "科幻小说入门");
        assert_eq!(kws[0].priority, KeywordPriority::High);
        assert_eq!(llm.system_prompt(0), "keyword_generation:base");
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let llm = ScriptedLlm::new(vec![Err("503")]);
        let wf = workflow(llm, StubRetriever::returning("", serde_json::Value::Null));

        let err = wf.generate_keywords("books").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Llm(_)));
    }

    #[tokio::test]
    async fn blank_input_rejected_before_llm() {
        let llm = ScriptedLlm::new(vec![]);
        let wf = workflow(llm.clone(), StubRetriever::returning("", serde_json::Value::Null));

        assert!(matches!(
            wf.generate_keywords(" ").await,
            Err(WorkflowError::InvalidInput(_))
        ));
        assert_eq!(llm.call_count(), 0);
    }
}
