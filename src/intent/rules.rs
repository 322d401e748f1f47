//! Pre-LLM fast path for intent routing.
//!
//! Decides whether the previous turn's mode obviously carries over to the
//! current message, so the classifier call can be skipped:
//! - no previous mode, empty input, injection risk, or a greeting → never skip
//! - after `deep`: short (≤ 24 chars) input equal to or ending with a continue keyword
//! - after `text`: very short (≤ 12 chars) input equal to an acknowledgment keyword
//!
//! Matching is exact or suffix-only so a long new question that merely
//! contains "continue" is still classified.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::safety::has_prompt_injection_risk;

/// Max input length (chars) for a deep-mode continuation.
pub const DEEP_BYPASS_MAX_CHARS: usize = 24;

/// Max input length (chars) for a text-mode acknowledgment.
pub const TEXT_BYPASS_MAX_CHARS: usize = 12;

const GREETINGS: &[&str] = &[
    "你好", "您好", "嗨", "哈喽", "早上好", "下午好", "晚上好", "hi", "hello", "hey",
    "good morning", "good afternoon", "good evening",
];

const CONTINUE_KEYWORDS: &[&str] = &[
    "继续", "继续下一步", "下一步", "接着", "接着来", "开始", "开始吧", "执行", "好的继续",
    "继续吧", "continue", "next", "go on", "go ahead", "proceed", "next step",
];

const ACK_KEYWORDS: &[&str] = &[
    "好的", "好", "嗯", "谢谢", "多谢", "收到", "明白", "明白了", "了解", "可以", "ok", "okay",
    "thanks", "thank you", "thx", "got it",
];

/// Mode a chat turn runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Single text search against the book index.
    Text,
    /// Draft-driven multi-query search after deep research.
    Deep,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Text => "text",
            ChatMode::Deep => "deep",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ChatMode::Text),
            "deep" => Ok(ChatMode::Deep),
            other => Err(format!("unknown chat mode: '{other}'")),
        }
    }
}

/// Exact or prefix match against the greeting list.
pub fn is_greeting(content: &str) -> bool {
    let lowered = content.trim().to_lowercase();
    GREETINGS
        .iter()
        .any(|g| lowered == *g || lowered.starts_with(g))
}

/// Should the classifier be skipped because `previous_mode` obviously continues?
pub fn should_bypass_classifier(content: &str, previous_mode: Option<ChatMode>) -> bool {
    let Some(mode) = previous_mode else {
        return false;
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }

    if has_prompt_injection_risk(trimmed) {
        debug!("Injection risk in continuation candidate, forcing classification");
        return false;
    }

    if is_greeting(trimmed) {
        return false;
    }

    let lowered = trimmed.to_lowercase();
    let len = trimmed.chars().count();

    let bypass = match mode {
        ChatMode::Deep => {
            len <= DEEP_BYPASS_MAX_CHARS
                && CONTINUE_KEYWORDS
                    .iter()
                    .any(|k| lowered == *k || lowered.ends_with(k))
        }
        ChatMode::Text => len <= TEXT_BYPASS_MAX_CHARS && ACK_KEYWORDS.contains(&lowered.as_str()),
    };

    if bypass {
        debug!(mode = %mode, "Classifier bypassed for continuation");
    }
    bypass
}
