//! Research drafting: web search → article analysis → cross analysis.
//!
//! [`ResearchWorkflow::run_draft_workflow`] searches once on the raw input.
//! [`ResearchWorkflow::run_deep_research`] expands the input into keywords,
//! analyses each keyword's results, merges them, and seeds book retrieval
//! with the resulting draft.

use tracing::{info, warn};

use super::{
    DeepResearchResult, DraftWorkflowResult, KeywordResearch, ResearchWorkflow, require_input,
};
use crate::error::WorkflowError;
use crate::llm::{LlmConfig, generate};
use crate::prompts::PromptName;
use crate::retrieval::{MultiQueryRequest, RetrievalResult};
use crate::search::{WebSearchSnippet, format_citations};

impl ResearchWorkflow {
    /// Single-query research seed. Any search-independent failure propagates.
    pub async fn run_draft_workflow(
        &self,
        user_input: &str,
    ) -> Result<DraftWorkflowResult, WorkflowError> {
        let input = require_input(user_input)?;
        let config = self.default_config()?;

        let snippets = self
            .search
            .search(input, self.settings.draft_search_top_k)
            .await;
        info!(query = %input, results = snippets.len(), "Draft web search complete");

        let article_analysis = self.analyse_articles(&config, input, input, &snippets).await?;
        let cross_analysis = self
            .cross_analyse(&config, input, &article_analysis)
            .await?;
        let draft_markdown = cross_analysis.trim().to_string();

        info!(
            user_input = %input,
            draft_chars = draft_markdown.chars().count(),
            "Draft workflow complete"
        );

        Ok(DraftWorkflowResult {
            user_input: input.to_string(),
            search_snippets: snippets,
            article_analysis,
            cross_analysis,
            draft_markdown,
        })
    }

    /// Keywords → per-keyword search and analysis → cross analysis → book retrieval.
    ///
    /// An empty retrieval is returned as-is; the chat step decides what it means.
    pub async fn run_deep_research(
        &self,
        user_input: &str,
    ) -> Result<DeepResearchResult, WorkflowError> {
        let input = require_input(user_input)?;
        let config = self.default_config()?;

        let keywords = self.generate_keywords(input).await?;

        let mut per_keyword = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            let snippets = self
                .search
                .search(&keyword.keyword, self.settings.draft_search_top_k)
                .await;
            info!(
                keyword = %keyword.keyword,
                priority = %keyword.priority,
                results = snippets.len(),
                "Keyword web search complete"
            );
            let analysis = self
                .analyse_articles(&config, input, &keyword.keyword, &snippets)
                .await?;
            per_keyword.push(KeywordResearch {
                keyword: keyword.clone(),
                snippets,
                analysis,
            });
        }

        let combined = per_keyword
            .iter()
            .map(|r| format!("### {}\n{}", r.keyword.keyword, r.analysis.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let cross_analysis = self.cross_analyse(&config, input, &combined).await?;
        let draft_markdown = cross_analysis.trim().to_string();

        let retrieval = if draft_markdown.is_empty() {
            warn!(user_input = %input, "Cross analysis produced an empty draft, skipping book retrieval");
            RetrievalResult::default()
        } else {
            self.retriever
                .multi_query(MultiQueryRequest {
                    markdown: draft_markdown.clone(),
                    per_query_top_k: self.settings.per_query_top_k,
                    final_top_k: self.settings.final_top_k,
                    enable_rerank: self.settings.enable_rerank,
                    filters: None,
                })
                .await?
        };

        info!(
            user_input = %input,
            keywords = keywords.len(),
            books = retrieval.books().len(),
            has_context = retrieval.has_context(),
            "Deep research complete"
        );

        Ok(DeepResearchResult {
            user_input: input.to_string(),
            keywords,
            per_keyword,
            cross_analysis,
            draft_markdown,
            retrieval,
        })
    }

    async fn analyse_articles(
        &self,
        config: &LlmConfig,
        user_input: &str,
        query: &str,
        snippets: &[WebSearchSnippet],
    ) -> Result<String, WorkflowError> {
        let system = self.prompts.load_prompt(PromptName::ArticleAnalysis).await?;
        let citations = format_citations(snippets);

        let mut prompt = format!("用户需求：\n{user_input}\n\n");
        if query != user_input {
            prompt.push_str(&format!("检索关键词：{query}\n\n"));
        }
        prompt.push_str(&format!("搜索结果：\n{citations}"));

        Ok(generate(self.llm.as_ref(), config, &system, &prompt).await?)
    }

    async fn cross_analyse(
        &self,
        config: &LlmConfig,
        user_input: &str,
        analysis: &str,
    ) -> Result<String, WorkflowError> {
        let system = self.prompts.load_prompt(PromptName::CrossAnalysis).await?;
        let prompt = format!("用户需求：\n{user_input}\n\n文章分析：\n{analysis}");
        Ok(generate(self.llm.as_ref(), config, &system, &prompt).await?)
    }
}
