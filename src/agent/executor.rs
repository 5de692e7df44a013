//! Task execution.
//!
//! Builds the multimodal analysis request for one task (analysis prompt,
//! reformulated query, task description, selected page images at high
//! detail) and returns the model's textual analysis. Provider errors
//! propagate so the orchestrator can mark the task failed with the error
//! kind recorded.

use tracing::info;

use super::config::PixieConfig;
use super::message::{ChatRequest, ContentPart, ImageDetail, system_message, user_parts};
use super::prompt::build_analysis_prompt;
use super::retry::ProviderSession;
use super::task::AgentTask;
use crate::document::Page;
use crate::error::AgentError;

/// Maximum tokens for a task analysis response.
const ANALYSIS_MAX_TOKENS: u32 = 600;

/// Runs the analysis call for a single task.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl TaskExecutor {
    /// Creates an executor from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.vision_model.clone(),
            temperature: config.temperatures.analysis,
            system_prompt,
        }
    }

    /// Analyzes the selected pages to complete one task.
    ///
    /// An empty selection completes without a model call, yielding a
    /// no-pages analysis note.
    ///
    /// # Errors
    ///
    /// Propagates provider errors; the caller maps them to a task failure.
    pub async fn analyze(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        task: &AgentTask,
        pages: &[Page],
    ) -> Result<String, AgentError> {
        if pages.is_empty() {
            return Ok(format!("No relevant pages were found for task: {}", task.name));
        }

        let request = self.build_request(query, task, pages);
        let response = session.multimodal(&request).await?;

        info!(
            task = %task.name,
            pages = pages.len(),
            "task analysis complete"
        );
        Ok(response.content.trim().to_string())
    }

    /// Builds the multimodal analysis request. Each page image is preceded
    /// by its `[Page k]` marker (the page's own number, so citations line
    /// up with the document) and its stored summary when one exists, and
    /// is included at high detail.
    fn build_request(&self, query: &str, task: &AgentTask, pages: &[Page]) -> ChatRequest {
        let mut parts = Vec::with_capacity(pages.len() * 2 + 1);
        parts.push(ContentPart::text(build_analysis_prompt(
            query,
            &task.description,
        )));

        for page in pages {
            parts.push(ContentPart::text(format!("[Page {}]", page.page_number)));
            if let Some(summary) = &page.summary {
                parts.push(ContentPart::text(format!("Page summary: {summary}")));
            }
            parts.push(ContentPart::image(&page.image_path, ImageDetail::High));
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(&self.system_prompt), user_parts(parts)],
            temperature: Some(self.temperature),
            max_tokens: Some(ANALYSIS_MAX_TOKENS),
            json_mode: false,
        }
    }
}
