//! Prompt store: named prompt templates, read once and cached.
//!
//! Templates live as markdown files under a prompt directory
//! (`PROMPTS_DIR`, default `./prompts`). The first request for a name reads
//! the file; later requests return the cached text until [`PromptStore::clear`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::PromptError;

/// The fixed set of prompts the workflow uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptName {
    KeywordGeneration,
    ArticleAnalysis,
    CrossAnalysis,
    QuestionClassification,
    Recommendation,
}

impl PromptName {
    pub const ALL: [PromptName; 5] = [
        PromptName::KeywordGeneration,
        PromptName::ArticleAnalysis,
        PromptName::CrossAnalysis,
        PromptName::QuestionClassification,
        PromptName::Recommendation,
    ];

    /// File stem under the prompt directory.
    pub fn file_stem(&self) -> &'static str {
        match self {
            PromptName::KeywordGeneration => "keyword_generation",
            PromptName::ArticleAnalysis => "article_analysis",
            PromptName::CrossAnalysis => "cross_analysis",
            PromptName::QuestionClassification => "question_classification",
            PromptName::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for PromptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Durable storage the store reads from on a cache miss.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn read(&self, name: PromptName) -> Result<String, PromptError>;
}

/// Reads `<dir>/<stem>.md`.
pub struct FsPromptSource {
    dir: PathBuf,
}

impl FsPromptSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: PromptName) -> PathBuf {
        self.dir.join(format!("{}.md", name.file_stem()))
    }
}

#[async_trait]
impl PromptSource for FsPromptSource {
    async fn read(&self, name: PromptName) -> Result<String, PromptError> {
        let path = self.path_for(name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PromptError::NotFound {
                    name: name.to_string(),
                    location: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(PromptError::Io {
                    name: name.to_string(),
                    source: e,
                });
            }
        };

        // An empty template is as good as a missing one.
        if text.trim().is_empty() {
            return Err(PromptError::NotFound {
                name: name.to_string(),
                location: path.display().to_string(),
            });
        }
        Ok(text)
    }
}

/// Process-lifetime prompt cache in front of a [`PromptSource`].
pub struct PromptStore {
    source: Arc<dyn PromptSource>,
    cache: RwLock<HashMap<PromptName, Arc<str>>>,
}

impl PromptStore {
    /// Create an empty store.
    pub fn new(source: Arc<dyn PromptSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Store backed by a prompt directory.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Arc<Self> {
        Self::new(Arc::new(FsPromptSource::new(dir)))
    }

    /// Get a prompt, reading it from storage on first use.
    pub async fn load_prompt(&self, name: PromptName) -> Result<Arc<str>, PromptError> {
        if let Some(text) = self.cache.read().await.get(&name) {
            return Ok(Arc::clone(text));
        }

        // Two concurrent misses may both read; both store the same text.
        let text: Arc<str> = self.source.read(name).await?.into();
        debug!(prompt = %name, chars = text.chars().count(), "Loaded prompt from storage");

        let mut cache = self.cache.write().await;
        let entry = cache.entry(name).or_insert(text);
        Ok(Arc::clone(entry))
    }

    /// Drop every cached prompt.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let count = cache.len();
        cache.clear();
        debug!(count, "Cleared prompt cache");
    }

    /// Number of cached prompts.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
