//! Provider-agnostic message types for model communication.
//!
//! These types decouple agent logic from any specific vendor SDK. Multimodal
//! content is modeled as a tagged sequence of parts; each provider
//! pattern-matches on the variants when serializing to its wire format.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Rendering fidelity requested for an image part.
///
/// Page selection uses low detail (many images, coarse judgment); task
/// analysis uses high detail (few images, fine-grained reading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Downscaled rendering, cheaper and faster.
    Low,
    /// Full-resolution rendering.
    High,
}

/// One element of a multimodal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// A text fragment.
    Text {
        /// The text content.
        text: String,
    },
    /// A page image, referenced by a handle the provider resolves.
    Image {
        /// Path to the image file.
        path: String,
        /// Requested rendering fidelity.
        detail: ImageDetail,
    },
}

impl ContentPart {
    /// Creates a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image part.
    #[must_use]
    pub fn image(path: impl Into<String>, detail: ImageDetail) -> Self {
        Self::Image {
            path: path.into(),
            detail,
        }
    }
}

/// Message content: plain text or a sequence of multimodal parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Text-only content.
    Text(String),
    /// Heterogeneous text and image parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the content, ignoring image parts.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Image { .. } => None,
                    })
                    .collect();
                texts.join("\n")
            }
        }
    }

    /// Whether the content contains any image part.
    #[must_use]
    pub fn has_images(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::Image { .. })),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Message content.
    pub content: MessageContent,
}

/// A chat completion request (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Request JSON-formatted output where the provider supports it.
    pub json_mode: bool,
}

/// Token usage statistics from a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A chat completion response (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// One turn of the caller's conversation with the agent.
///
/// Content is validated non-empty on construction; well-formed histories
/// additionally alternate user and assistant roles, which the context
/// processor tolerates deviations from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who produced the turn.
    pub role: Role,
    /// Turn content.
    pub content: String,
    /// When the turn was recorded.
    pub timestamp: SystemTime,
}

impl ConversationMessage {
    /// Creates a turn stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] when `content` is empty or
    /// whitespace-only.
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self, AgentError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(AgentError::Validation {
                message: "conversation message content cannot be empty".to_string(),
            });
        }
        Ok(Self {
            role,
            content,
            timestamp: SystemTime::now(),
        })
    }

    /// Creates a user turn.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] for empty content.
    pub fn user(content: impl Into<String>) -> Result<Self, AgentError> {
        Self::new(Role::User, content)
    }

    /// Creates an assistant turn.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] for empty content.
    pub fn assistant(content: impl Into<String>) -> Result<Self, AgentError> {
        Self::new(Role::Assistant, content)
    }
}

/// Creates a system message.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: MessageContent::Text(content.to_string()),
    }
}

/// Creates a text-only user message.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: MessageContent::Text(content.to_string()),
    }
}

/// Creates a multimodal user message from content parts.
#[must_use]
pub const fn user_parts(parts: Vec<ContentPart>) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: MessageContent::Parts(parts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message() {
        let msg = system_message("You are helpful.");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content.text(), "You are helpful.");
        assert!(!msg.content.has_images());
    }

    #[test]
    fn test_user_parts_detects_images() {
        let msg = user_parts(vec![
            ContentPart::text("[Page 1]"),
            ContentPart::image("/tmp/p1.jpg", ImageDetail::Low),
        ]);
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.has_images());
        assert_eq!(msg.content.text(), "[Page 1]");
    }

    #[test]
    fn test_content_text_joins_fragments() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("a"),
            ContentPart::image("x.jpg", ImageDetail::High),
            ContentPart::text("b"),
        ]);
        assert_eq!(content.text(), "a\nb");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::System).unwrap_or_default();
        assert_eq!(json, "\"system\"");
        let json = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_conversation_message_constructors() {
        let msg = ConversationMessage::user("hello").unwrap_or_else(|_| unreachable!());
        assert_eq!(msg.role, Role::User);
        let msg = ConversationMessage::assistant("hi").unwrap_or_else(|_| unreachable!());
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_conversation_message_rejects_empty_content() {
        assert!(matches!(
            ConversationMessage::user(""),
            Err(AgentError::Validation { .. })
        ));
        assert!(matches!(
            ConversationMessage::assistant("   \n"),
            Err(AgentError::Validation { .. })
        ));
    }

    #[test]
    fn test_content_part_tagged_serialization() {
        let part = ContentPart::image("p.jpg", ImageDetail::Low);
        let json = serde_json::to_string(&part).unwrap_or_default();
        assert!(json.contains("\"type\":\"image\""));
        assert!(json.contains("\"detail\":\"low\""));
    }
}
