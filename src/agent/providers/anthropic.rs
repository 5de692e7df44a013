//! Anthropic provider implementation over the messages API.
//!
//! Anthropic's wire format differs from the OpenAI shape in two ways the
//! agent cares about: system instructions go in a top-level `system` field
//! rather than the message list, and images are `image` blocks with a
//! base64 source rather than data URLs.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::message::{
    ChatRequest, ChatResponse, ContentPart, MessageContent, Role, TokenUsage,
};
use crate::agent::provider::Provider;
use crate::error::AgentError;

/// Anthropic messages endpoint.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// Pinned API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The messages API requires `max_tokens`; used when the request has none.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic messages API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Creates a provider with an optional base URL override.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(ANTHROPIC_API_URL).to_string(),
        }
    }

    /// Converts the generic request to the Anthropic wire shape, reading
    /// and encoding any page images.
    async fn build_request(request: &ChatRequest) -> Result<WireRequest, AgentError> {
        // System instructions move to the top-level field.
        let system_parts: Vec<String> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.text())
            .collect();
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let mut messages = Vec::new();
        for msg in &request.messages {
            let role = match msg.role {
                Role::System => continue,
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let content = match &msg.content {
                MessageContent::Text(text) => vec![WireBlock::Text { text: text.clone() }],
                MessageContent::Parts(parts) => {
                    let mut blocks = Vec::with_capacity(parts.len());
                    for part in parts {
                        blocks.push(Self::convert_part(part).await?);
                    }
                    blocks
                }
            };
            messages.push(WireMessage { role, content });
        }

        Ok(WireRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            system,
            messages,
        })
    }

    async fn convert_part(part: &ContentPart) -> Result<WireBlock, AgentError> {
        match part {
            ContentPart::Text { text } => Ok(WireBlock::Text { text: text.clone() }),
            ContentPart::Image { path, .. } => {
                let (data, media_type) = super::encode_image(path).await?;
                Ok(WireBlock::Image {
                    source: WireImageSource {
                        kind: "base64",
                        media_type,
                        data,
                    },
                })
            }
        }
    }

    /// Maps an HTTP status to a pipeline error kind.
    fn map_status(status: StatusCode, body: &str) -> AgentError {
        let message = format!("{status}: {body}");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth { message },
            StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited { message },
            StatusCode::REQUEST_TIMEOUT => AgentError::Timeout { message },
            s if s.is_server_error() => AgentError::Transient { message },
            _ => AgentError::BadRequest { message },
        }
    }

    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let wire_request = Self::build_request(request).await?;

        debug!(model = %wire_request.model, "sending Anthropic request");
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        message: e.to_string(),
                    }
                } else {
                    AgentError::Transient {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AgentError::Transient {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Self::map_status(status, &body));
        }

        let parsed: WireResponse =
            serde_json::from_str(&body).map_err(|e| AgentError::Transient {
                message: format!("malformed response body: {e}"),
            })?;

        let content = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason: parsed.stop_reason,
        })
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn process_text(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.execute(request).await
    }

    async fn process_multimodal(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.execute(request).await
    }
}

/// Anthropic messages API request.
#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
}

/// A message in the Anthropic request.
#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

/// A content block in an Anthropic message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireBlock {
    Text {
        text: String,
    },
    Image {
        source: WireImageSource,
    },
}

/// Base64 image source block.
#[derive(Debug, Serialize)]
struct WireImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

/// Anthropic messages API response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

/// A content block in the Anthropic response.
#[derive(Debug, Deserialize)]
struct WireResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Token accounting in the Anthropic response.
#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
