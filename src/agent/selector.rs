//! Vision-based page selection.
//!
//! For one task, the selector shows the model every candidate page image
//! from the task's assigned document (each preceded by a `[Page k]`
//! marker) and asks for the most relevant page numbers. Candidate sets
//! that already fit the per-task budget skip the model entirely. The
//! selection is validated against the document; any failure falls back to
//! the first pages in order, so a task always has something to analyze.

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::config::PixieConfig;
use super::json;
use super::message::{ChatRequest, ContentPart, ImageDetail, system_message, user_parts};
use super::prompt::build_selection_prompt;
use super::retry::ProviderSession;
use super::task::AgentTask;
use crate::document::Page;
use crate::error::AgentError;

/// Maximum tokens for the selection call.
const SELECTION_MAX_TOKENS: u32 = 300;

/// Model response for a page selection request.
#[derive(Debug, Deserialize)]
struct Selection {
    /// Raw values so one malformed entry does not invalidate the rest.
    #[serde(default)]
    selected_pages: Vec<serde_json::Value>,
    #[serde(default)]
    reasoning: String,
}

/// Selects relevant pages by showing page images to a vision model.
#[derive(Debug, Clone)]
pub struct VisionPageSelector {
    model: String,
    max_pages: usize,
    include_summaries: bool,
    temperature: f32,
    system_prompt: String,
}

impl VisionPageSelector {
    /// Creates a selector from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.vision_model.clone(),
            max_pages: config.max_pages_per_task,
            include_summaries: config.include_page_summaries_in_selection,
            temperature: config.temperatures.selection,
            system_prompt,
        }
    }

    /// Selects the most relevant pages of `pages` for `task`.
    ///
    /// When the candidate set already fits within `max_pages_per_task`,
    /// every page is returned and no model call is made. Otherwise the
    /// returned pages are a subset of `pages` in first-mention order,
    /// deduplicated and capped at `max_pages_per_task`. A parse failure,
    /// an empty selection, or a non-fatal provider error falls back to the
    /// first `min(len, max_pages_per_task)` pages.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn select_pages(
        &self,
        session: &ProviderSession<'_>,
        task: &AgentTask,
        pages: &[Page],
    ) -> Result<Vec<Page>, AgentError> {
        if pages.is_empty() {
            warn!(task = %task.name, "no pages available for selection");
            return Ok(Vec::new());
        }

        if pages.len() <= self.max_pages {
            debug!(
                task = %task.name,
                pages = pages.len(),
                "candidate pages fit within budget, returning all"
            );
            return Ok(pages.to_vec());
        }

        let request = self.build_request(task, pages);
        let response = match session.multimodal(&request).await {
            Ok(response) => response,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(task = %task.name, error = %e, "page selection call failed, using fallback");
                return Ok(self.fallback(pages));
            }
        };

        let indices = Self::parse_selection(&response.content);
        let validated = Self::validate_selection(&indices, pages.len(), self.max_pages);
        if validated.is_empty() {
            warn!(task = %task.name, "no valid pages selected, using fallback");
            return Ok(self.fallback(pages));
        }

        info!(
            task = %task.name,
            selected = validated.len(),
            total = pages.len(),
            "selected pages for task"
        );
        Ok(validated.into_iter().map(|i| pages[i - 1].clone()).collect())
    }

    /// Builds the multimodal selection request: prompt text, then for each
    /// page a `[Page k]` marker, its stored summary when configured, and
    /// the page image at low detail.
    fn build_request(&self, task: &AgentTask, pages: &[Page]) -> ChatRequest {
        let mut parts = Vec::with_capacity(pages.len() * 3 + 1);
        parts.push(ContentPart::text(build_selection_prompt(
            &task.name,
            &task.description,
            self.max_pages,
        )));

        for (k, page) in pages.iter().enumerate() {
            parts.push(ContentPart::text(format!("[Page {}]", k + 1)));
            if self.include_summaries
                && let Some(summary) = &page.summary
            {
                parts.push(ContentPart::text(format!("Page summary: {summary}")));
            }
            parts.push(ContentPart::image(&page.image_path, ImageDetail::Low));
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(&self.system_prompt), user_parts(parts)],
            temperature: Some(self.temperature),
            max_tokens: Some(SELECTION_MAX_TOKENS),
            json_mode: true,
        }
    }

    /// Parses 1-based page numbers from model output. Non-integer entries
    /// are skipped; garbled output yields an empty list.
    fn parse_selection(content: &str) -> Vec<usize> {
        match json::parse_json::<Selection>(content) {
            Ok(selection) => {
                debug!(reasoning = %selection.reasoning, "page selection reasoning");
                selection
                    .selected_pages
                    .iter()
                    .filter_map(serde_json::Value::as_u64)
                    .filter_map(|n| usize::try_from(n).ok())
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "failed to parse page selection");
                Vec::new()
            }
        }
    }

    /// Drops out-of-range indices, deduplicates preserving order, and
    /// truncates to `max_pages`.
    fn validate_selection(indices: &[usize], page_count: usize, max_pages: usize) -> Vec<usize> {
        let mut seen = std::collections::HashSet::new();
        indices
            .iter()
            .copied()
            .filter(|&i| i >= 1 && i <= page_count)
            .filter(|&i| seen.insert(i))
            .take(max_pages)
            .collect()
    }

    /// Deterministic fallback: the first `min(len, max_pages)` pages.
    fn fallback(&self, pages: &[Page]) -> Vec<Page> {
        pages[..pages.len().min(self.max_pages)].to_vec()
    }
}
