//! Response synthesis.
//!
//! Combines the analyses of all completed tasks into the final answer.
//! When no task completed, the synthesizer reports the failures instead of
//! inventing content; when the synthesis call itself fails it falls back
//! to a deterministic concatenation of the task analyses.

use std::fmt::Write;

use tracing::{info, warn};

use super::config::PixieConfig;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::build_synthesis_prompt;
use super::retry::ProviderSession;
use super::task::{AgentTask, TaskResult};
use crate::error::AgentError;

/// Maximum tokens for the synthesis response.
const SYNTHESIS_MAX_TOKENS: u32 = 2048;

/// Synthesizes task results into the final answer.
#[derive(Debug, Clone)]
pub struct ResponseSynthesizer {
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl ResponseSynthesizer {
    /// Creates a synthesizer from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.text_model.clone(),
            temperature: config.temperatures.synthesis,
            system_prompt,
        }
    }

    /// Produces the final answer from completed task results.
    ///
    /// With zero completed results the answer is built from the failed
    /// tasks' recorded failure kinds, without a model call. A non-fatal
    /// provider error falls back to concatenating the analyses.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn synthesize(
        &self,
        session: &ProviderSession<'_>,
        original_query: &str,
        reformulated_query: &str,
        results: &[TaskResult],
        failed: &[&AgentTask],
    ) -> Result<String, AgentError> {
        if results.is_empty() {
            warn!("no completed tasks to synthesize");
            return Ok(Self::failure_summary(failed));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_synthesis_prompt(
                    original_query,
                    reformulated_query,
                    results,
                )),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(SYNTHESIS_MAX_TOKENS),
            json_mode: false,
        };

        match session.text(&request).await {
            Ok(response) => {
                info!(tasks = results.len(), "synthesized final response");
                Ok(response.content.trim().to_string())
            }
            Err(e) if e.is_pipeline_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "synthesis call failed, using fallback response");
                Ok(Self::fallback_response(original_query, results))
            }
        }
    }

    /// Explains why no answer could be produced, grounded in the failed
    /// tasks' recorded failure kinds.
    fn failure_summary(failed: &[&AgentTask]) -> String {
        if failed.is_empty() {
            return "I couldn't find any relevant information to answer your query.".to_string();
        }

        let mut summary =
            String::from("I couldn't complete the analysis needed to answer your query.\n");
        for task in failed {
            let kind = task
                .failure
                .map_or_else(|| "unknown".to_string(), |k| k.to_string());
            let _ = writeln!(summary, "- {} failed ({kind})", task.name);
        }
        summary.trim_end().to_string()
    }

    /// Deterministic fallback: the task analyses stitched together.
    fn fallback_response(original_query: &str, results: &[TaskResult]) -> String {
        let mut response = format!(
            "Based on my analysis of the documents, here's what I found regarding \
             your query: {original_query}\n"
        );
        for result in results {
            let _ = write!(response, "\n**{}**\n{}\n", result.task.name, result.analysis);
        }
        response.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::task::FailureKind;

    fn completed_result(name: &str, analysis: &str) -> TaskResult {
        let mut task = AgentTask::new(name, format!("find {name}"), "d1");
        task.start();
        task.complete();
        TaskResult {
            task,
            selected_pages: Vec::new(),
            analysis: analysis.to_string(),
        }
    }

    #[test]
    fn test_failure_summary_names_tasks_and_kinds() {
        let mut t1 = AgentTask::new("Find revenue", "revenue", "d1");
        t1.start();
        t1.fail(FailureKind::ProviderTransient);
        let mut t2 = AgentTask::new("Find expenses", "expenses", "d2");
        t2.start();
        t2.fail(FailureKind::StorageNotFound);

        let summary = ResponseSynthesizer::failure_summary(&[&t1, &t2]);
        assert!(summary.contains("Find revenue failed (provider_transient)"));
        assert!(summary.contains("Find expenses failed (storage_not_found)"));
    }

    #[test]
    fn test_failure_summary_without_failures() {
        let summary = ResponseSynthesizer::failure_summary(&[]);
        assert!(summary.contains("couldn't find any relevant information"));
    }

    #[test]
    fn test_fallback_response_includes_analyses() {
        let results = vec![
            completed_result("revenue", "Revenue: $10M"),
            completed_result("expenses", "Expenses: $7M"),
        ];
        let response = ResponseSynthesizer::fallback_response("Q3 numbers?", &results);
        assert!(response.contains("Q3 numbers?"));
        assert!(response.contains("Revenue: $10M"));
        assert!(response.contains("Expenses: $7M"));
        assert!(response.contains("**revenue**"));
    }
}
