//! Conversation context processing.
//!
//! Long conversations are compressed before query reformulation: older
//! turns are folded into a short factual summary by a text-only model call,
//! while the most recent turns are kept verbatim. Short conversations pass
//! through unchanged.

use tracing::{debug, warn};

use super::config::PixieConfig;
use super::message::{ChatRequest, ConversationMessage, Role, system_message, user_message};
use super::prompt::build_summary_prompt;
use super::retry::ProviderSession;
use crate::error::AgentError;

/// Maximum tokens for the conversation summary call.
const SUMMARY_MAX_TOKENS: u32 = 500;

/// Compresses conversation history into a context string plus a verbatim
/// tail of recent turns.
#[derive(Debug, Clone)]
pub struct ContextProcessor {
    model: String,
    max_turns: usize,
    turns_to_summarize: usize,
    turns_to_keep_full: usize,
    temperature: f32,
    system_prompt: String,
}

impl ContextProcessor {
    /// Creates a processor from configuration and the summary system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.text_model.clone(),
            max_turns: config.max_conversation_turns,
            turns_to_summarize: config.turns_to_summarize,
            turns_to_keep_full: config.turns_to_keep_full,
            temperature: config.temperatures.summary,
            system_prompt,
        }
    }

    /// Processes conversation history into `(context, recent_turns)`.
    ///
    /// Histories at or under `max_conversation_turns` user turns are
    /// formatted verbatim with no model call. Longer histories get their
    /// older turns summarized; if the summary call fails with a
    /// non-fatal error the full history is formatted instead.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn process(
        &self,
        session: &ProviderSession<'_>,
        history: &[ConversationMessage],
    ) -> Result<(String, Vec<ConversationMessage>), AgentError> {
        if history.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let turns = count_user_turns(history);
        if turns <= self.max_turns {
            return Ok((format_messages(history), history.to_vec()));
        }

        debug!(turns, "summarizing older conversation turns");
        let (older, tail) = self.split_for_summary(history);

        let summary = match self.summarize(session, &older).await {
            Ok(summary) => summary,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "conversation summarization failed, using full history");
                return Ok((format_messages(history), history.to_vec()));
            }
        };

        let context = format!(
            "Previous conversation summary:\n{summary}\n\nRecent conversation:\n{}",
            format_messages(&tail)
        );
        Ok((context, tail))
    }

    /// Splits history into the older slice to summarize and the tail kept
    /// verbatim. The split falls just before the user turn after the
    /// `turns_to_summarize`-th one; the tail is capped at
    /// `turns_to_keep_full` turns.
    fn split_for_summary(
        &self,
        history: &[ConversationMessage],
    ) -> (Vec<ConversationMessage>, Vec<ConversationMessage>) {
        let mut user_seen = 0;
        let mut split = history.len();
        for (i, msg) in history.iter().enumerate() {
            if msg.role == Role::User {
                user_seen += 1;
                if user_seen == self.turns_to_summarize + 1 {
                    split = i;
                    break;
                }
            }
        }

        let (older, tail) = history.split_at(split);
        let max_tail = self.turns_to_keep_full * 2;
        let tail = if tail.len() > max_tail {
            &tail[tail.len() - max_tail..]
        } else {
            tail
        };
        (older.to_vec(), tail.to_vec())
    }

    async fn summarize(
        &self,
        session: &ProviderSession<'_>,
        messages: &[ConversationMessage],
    ) -> Result<String, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_summary_prompt(&format_messages(messages))),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(SUMMARY_MAX_TOKENS),
            json_mode: false,
        };
        let response = session.text(&request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Counts conversation turns (user messages only).
fn count_user_turns(messages: &[ConversationMessage]) -> usize {
    messages.iter().filter(|m| m.role == Role::User).count()
}

/// Formats messages as readable context.
fn format_messages(messages: &[ConversationMessage]) -> String {
    let parts: Vec<String> = messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{role}: {}", msg.content)
        })
        .collect();
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(turns: usize) -> Vec<ConversationMessage> {
        let mut messages = Vec::new();
        for i in 1..=turns {
            messages.push(
                ConversationMessage::user(format!("question {i}"))
                    .unwrap_or_else(|_| unreachable!()),
            );
            messages.push(
                ConversationMessage::assistant(format!("answer {i}"))
                    .unwrap_or_else(|_| unreachable!()),
            );
        }
        messages
    }

    fn processor() -> ContextProcessor {
        let config = PixieConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        ContextProcessor::new(&config, "summarize".to_string())
    }

    #[test]
    fn test_count_user_turns() {
        assert_eq!(count_user_turns(&history(4)), 4);
        assert_eq!(count_user_turns(&[]), 0);
    }

    #[test]
    fn test_format_messages() {
        let text = format_messages(&history(2));
        assert!(text.contains("User: question 1"));
        assert!(text.contains("Assistant: answer 2"));
    }

    #[test]
    fn test_split_keeps_recent_turns() {
        let p = processor();
        // 10 turns: summarize the first 5, keep the last 3 verbatim.
        let (older, tail) = p.split_for_summary(&history(10));
        assert_eq!(count_user_turns(&older), 5);
        assert_eq!(count_user_turns(&tail), 3);
        assert_eq!(tail.last().map(|m| m.content.clone()), Some("answer 10".to_string()));
    }

    #[test]
    fn test_split_handles_short_tail() {
        let p = processor();
        // 6 turns: older slice is 5 turns, tail is the single remaining turn.
        let (older, tail) = p.split_for_summary(&history(6));
        assert_eq!(count_user_turns(&older), 5);
        assert_eq!(count_user_turns(&tail), 1);
    }
}
