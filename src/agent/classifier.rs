//! Query classification.
//!
//! Decides whether a query needs document analysis at all. Queries that do
//! not (greetings, capability questions) get a direct answer and the
//! pipeline short-circuits. Classification fails open: any parse failure
//! or non-fatal provider error routes the query into document analysis.

use serde::Deserialize;
use tracing::{info, warn};

use super::config::PixieConfig;
use super::json;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::build_classification_prompt;
use super::retry::ProviderSession;
use crate::error::AgentError;

/// Maximum tokens for the classification call.
const CLASSIFICATION_MAX_TOKENS: u32 = 450;

/// Outcome of classifying a query.
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    /// Whether the query requires document analysis.
    #[serde(default = "default_needs_documents")]
    pub needs_documents: bool,
    /// The model's explanation of its decision.
    #[serde(default)]
    pub reasoning: String,
    /// Direct answer, present when `needs_documents` is false.
    #[serde(default)]
    pub direct_answer: Option<String>,
}

const fn default_needs_documents() -> bool {
    true
}

impl Classification {
    /// Fail-open default: proceed with document analysis.
    fn needs_documents_fallback() -> Self {
        Self {
            needs_documents: true,
            reasoning: "classification unavailable, defaulting to document analysis".to_string(),
            direct_answer: None,
        }
    }
}

/// Classifies queries to determine the processing strategy.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl QueryClassifier {
    /// Creates a classifier from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.text_model.clone(),
            temperature: config.temperatures.classification,
            system_prompt,
        }
    }

    /// Classifies a query.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate; any other failure yields the
    /// fail-open classification.
    pub async fn classify(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
    ) -> Result<Classification, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_classification_prompt(query)),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(CLASSIFICATION_MAX_TOKENS),
            json_mode: true,
        };

        let response = match session.text(&request).await {
            Ok(response) => response,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "classification call failed, defaulting to document analysis");
                return Ok(Classification::needs_documents_fallback());
            }
        };

        let classification = Self::parse_classification(&response.content);
        info!(
            needs_documents = classification.needs_documents,
            reasoning = %classification.reasoning,
            "query classified"
        );
        Ok(classification)
    }

    /// Parses the model output, failing open to document analysis.
    fn parse_classification(content: &str) -> Classification {
        match json::parse_json::<Classification>(content) {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, "failed to parse classification, defaulting to document analysis");
                Classification::needs_documents_fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_needs_documents() {
        let content = r#"{"needs_documents": true, "reasoning": "asks for financial data"}"#;
        let c = QueryClassifier::parse_classification(content);
        assert!(c.needs_documents);
        assert_eq!(c.reasoning, "asks for financial data");
        assert!(c.direct_answer.is_none());
    }

    #[test]
    fn test_parse_direct_answer() {
        let content = r#"{"needs_documents": false, "reasoning": "greeting", "direct_answer": "I analyze documents."}"#;
        let c = QueryClassifier::parse_classification(content);
        assert!(!c.needs_documents);
        assert_eq!(c.direct_answer.as_deref(), Some("I analyze documents."));
    }

    #[test]
    fn test_parse_garbled_fails_open() {
        let c = QueryClassifier::parse_classification("not valid json");
        assert!(c.needs_documents);
        assert!(c.direct_answer.is_none());
    }

    #[test]
    fn test_parse_missing_field_fails_open() {
        let c = QueryClassifier::parse_classification(r#"{"reasoning": "unclear"}"#);
        assert!(c.needs_documents);
    }

    #[test]
    fn test_parse_tolerates_surrounding_prose() {
        let content = "Sure! {\"needs_documents\": false, \"reasoning\": \"small talk\", \"direct_answer\": \"Hello!\"}";
        let c = QueryClassifier::parse_classification(content);
        assert!(!c.needs_documents);
        assert_eq!(c.direct_answer.as_deref(), Some("Hello!"));
    }
}
