//! Pluggable model provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into vendor-specific API calls. This keeps all agent logic decoupled from
//! any particular model vendor, including how page images are inlined.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for multimodal model backends.
///
/// Implementations handle the transport layer for a specific vendor while
/// presenting a uniform interface to the agent. Providers are stateless
/// across calls apart from authenticated-client state, and must be safe to
/// share between concurrent queries.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., `"openai"`, `"anthropic"`, `"openrouter"`).
    fn name(&self) -> &'static str;

    /// Executes a text-only chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] classified by failure kind: [`AgentError::Auth`],
    /// [`AgentError::RateLimited`], [`AgentError::Transient`],
    /// [`AgentError::BadRequest`], or [`AgentError::Timeout`].
    async fn process_text(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;

    /// Executes a chat completion whose messages may contain image parts.
    ///
    /// The provider resolves each image handle to its vendor-specific
    /// inline form (base64 block or data URL).
    ///
    /// # Errors
    ///
    /// Same classification as [`Provider::process_text`], plus
    /// [`AgentError::ImageRead`] when a page image cannot be loaded.
    async fn process_multimodal(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
