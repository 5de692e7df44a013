//! Query reformulation.
//!
//! Rewrites an elliptical follow-up query into a self-contained one by
//! resolving references against the conversation context. Reformulation is
//! best-effort: any parse failure, an unchanged verdict from the model, or
//! a non-fatal provider error falls back to the original query.

use serde::Deserialize;
use tracing::{debug, warn};

use super::config::PixieConfig;
use super::json;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::build_reformulation_prompt;
use super::retry::ProviderSession;
use crate::error::AgentError;

/// Maximum tokens for the reformulation call.
const REFORMULATION_MAX_TOKENS: u32 = 1024;

/// Model response for a reformulation request.
#[derive(Debug, Deserialize)]
struct Reformulation {
    reformulated: String,
    #[serde(default)]
    changed: bool,
}

/// Rewrites queries to stand alone for document search.
#[derive(Debug, Clone)]
pub struct QueryReformulator {
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl QueryReformulator {
    /// Creates a reformulator from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.text_model.clone(),
            temperature: config.temperatures.reformulation,
            system_prompt,
        }
    }

    /// Reformulates `query` against the conversation context.
    ///
    /// Returns the original query when the model reports no change was
    /// needed, when its output cannot be parsed, or when the call fails
    /// with a non-fatal error.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn reformulate(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        context: &str,
    ) -> Result<String, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_reformulation_prompt(context, query)),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(REFORMULATION_MAX_TOKENS),
            json_mode: true,
        };

        let response = match session.text(&request).await {
            Ok(response) => response,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "reformulation call failed, keeping original query");
                return Ok(query.to_string());
            }
        };

        Ok(Self::parse_reformulation(&response.content, query))
    }

    /// Parses the model output, falling back to the original query.
    fn parse_reformulation(content: &str, original: &str) -> String {
        match json::parse_json::<Reformulation>(content) {
            Ok(parsed) if parsed.changed && !parsed.reformulated.trim().is_empty() => {
                debug!(
                    original,
                    reformulated = %parsed.reformulated,
                    "query reformulated"
                );
                parsed.reformulated.trim().to_string()
            }
            Ok(_) => original.to_string(),
            Err(e) => {
                warn!(error = %e, "failed to parse reformulation, keeping original query");
                original.to_string()
            }
        }
    }
}
