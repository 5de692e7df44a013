//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override. Page images are inlined as
//! `data:image/...;base64` URLs in user message content parts.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequest, ImageUrl, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::message::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageDetail, MessageContent, Role,
    TokenUsage,
};
use crate::agent::provider::Provider;
use crate::error::AgentError;

/// `OpenAI`-compatible provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible with
/// any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider with an optional base URL override.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Converts one message, resolving image handles to data URLs.
    async fn convert_message(
        msg: &ChatMessage,
    ) -> Result<ChatCompletionRequestMessage, AgentError> {
        match msg.role {
            Role::System => Ok(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.text(),
                    ),
                    name: None,
                },
            )),
            Role::User => {
                let content = match &msg.content {
                    MessageContent::Text(text) => {
                        ChatCompletionRequestUserMessageContent::Text(text.clone())
                    }
                    MessageContent::Parts(parts) => {
                        let mut converted = Vec::with_capacity(parts.len());
                        for part in parts {
                            converted.push(Self::convert_part(part).await?);
                        }
                        ChatCompletionRequestUserMessageContent::Array(converted)
                    }
                };
                Ok(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage {
                        content,
                        name: None,
                    },
                ))
            }
            Role::Assistant => {
                #[allow(deprecated)]
                Ok(ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessage {
                        content: Some(
                            async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                                msg.content.text(),
                            ),
                        ),
                        name: None,
                        tool_calls: None,
                        refusal: None,
                        audio: None,
                        function_call: None,
                    },
                ))
            }
        }
    }

    /// Converts one content part, reading and encoding image files.
    async fn convert_part(
        part: &ContentPart,
    ) -> Result<ChatCompletionRequestUserMessageContentPart, AgentError> {
        match part {
            ContentPart::Text { text } => Ok(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText { text: text.clone() },
            )),
            ContentPart::Image { path, detail } => {
                let url = super::image_data_url(path).await?;
                let detail = match detail {
                    ImageDetail::Low => async_openai::types::ImageDetail::Low,
                    ImageDetail::High => async_openai::types::ImageDetail::High,
                };
                Ok(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url,
                            detail: Some(detail),
                        },
                    },
                ))
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    async fn build_request(
        request: &ChatRequest,
    ) -> Result<CreateChatCompletionRequest, AgentError> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            messages.push(Self::convert_message(msg).await?);
        }

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        Ok(CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            response_format,
            ..Default::default()
        })
    }

    /// Classifies an `async-openai` error into a pipeline error kind.
    fn map_error(err: OpenAIError) -> AgentError {
        match err {
            OpenAIError::Reqwest(e) => {
                if e.is_timeout() {
                    AgentError::Timeout {
                        message: e.to_string(),
                    }
                } else {
                    AgentError::Transient {
                        message: e.to_string(),
                    }
                }
            }
            OpenAIError::ApiError(api) => {
                let detail = format!("{:?} {:?}", api.r#type, api.code);
                Self::classify_api_error(&detail, api.message)
            }
            OpenAIError::JSONDeserialize(e) => AgentError::Transient {
                message: format!("malformed response body: {e}"),
            },
            other => AgentError::BadRequest {
                message: other.to_string(),
            },
        }
    }

    /// Classifies an API-level error from its type/code detail and message.
    fn classify_api_error(detail: &str, message: String) -> AgentError {
        let haystack = format!("{detail} {message}").to_ascii_lowercase();
        if haystack.contains("rate limit")
            || haystack.contains("rate_limit")
            || haystack.contains("quota")
        {
            AgentError::RateLimited { message }
        } else if haystack.contains("api key")
            || haystack.contains("api_key")
            || haystack.contains("authentication")
            || haystack.contains("permission")
        {
            AgentError::Auth { message }
        } else if haystack.contains("invalid_request_error") {
            AgentError::BadRequest { message }
        } else {
            AgentError::Transient { message }
        }
    }

    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request).await?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(Self::map_error)?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn process_text(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.execute(request).await
    }

    async fn process_multimodal(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.execute(request).await
    }
}
