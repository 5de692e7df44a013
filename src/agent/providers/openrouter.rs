//! OpenRouter provider.
//!
//! OpenRouter exposes an `OpenAI`-compatible chat completion API, so this
//! provider delegates to [`OpenAiProvider`] pointed at the OpenRouter
//! endpoint. Model names are namespaced (e.g. `openai/gpt-4o`).

use async_trait::async_trait;

use super::OpenAiProvider;
use crate::agent::message::{ChatRequest, ChatResponse};
use crate::agent::provider::Provider;
use crate::error::AgentError;

/// OpenRouter API endpoint (OpenAI-compatible).
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter provider backed by the OpenAI-compatible client.
#[derive(Debug)]
pub struct OpenRouterProvider {
    inner: OpenAiProvider,
}

impl OpenRouterProvider {
    /// Creates a provider against the OpenRouter endpoint.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            inner: OpenAiProvider::new(api_key, Some(OPENROUTER_BASE_URL)),
        }
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn process_text(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.inner.process_text(request).await
    }

    async fn process_multimodal(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.inner.process_multimodal(request).await
    }
}
