//! Tolerant JSON extraction from model output.
//!
//! Models are instructed to return bare JSON, but in practice wrap it in
//! markdown fences or surrounding prose. The parsers here extract the first
//! balanced JSON value from the raw text and deserialize it, so components
//! only have to define what happens when no valid JSON exists at all.

use serde::de::DeserializeOwned;

use crate::error::AgentError;

/// Extracts the first balanced JSON object or array from `content`.
///
/// Scans for the first `{` or `[` and returns the slice up to its matching
/// close bracket, honoring string literals and escapes. Returns `None` when
/// no balanced value exists.
#[must_use]
pub fn extract_first_json(content: &str) -> Option<&str> {
    let start = content.find(['{', '['])?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&content[start..=start + idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses the first balanced JSON value in `content` into `T`.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] when no balanced JSON value exists
/// or the value does not match the expected schema. The error message
/// carries a short preview of the raw output for diagnostics.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, AgentError> {
    let Some(json_str) = extract_first_json(content) else {
        return Err(parse_error("no JSON value found in response", content));
    };

    serde_json::from_str(json_str)
        .map_err(|e| parse_error(&format!("schema mismatch: {e}"), content))
}

fn parse_error(message: &str, content: &str) -> AgentError {
    let preview: String = content.chars().take(200).collect();
    AgentError::ResponseParse {
        message: format!(
            "{message}. Response length: {} bytes, preview: {preview:?}",
            content.len()
        ),
        content: content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        needs_documents: bool,
        reasoning: String,
    }

    #[test]
    fn test_extract_bare_object() {
        let content = r#"{"a": 1}"#;
        assert_eq!(extract_first_json(content), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_from_code_fence() {
        let content = "```json\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_first_json(content), Some(r#"{"a": [1, 2]}"#));
    }

    #[test]
    fn test_extract_from_surrounding_prose() {
        let content = "Here is my selection: {\"selected_pages\": [1, 3]} as requested.";
        assert_eq!(
            extract_first_json(content),
            Some(r#"{"selected_pages": [1, 3]}"#)
        );
    }

    #[test]
    fn test_extract_array() {
        let content = "[{\"name\": \"t1\"}, {\"name\": \"t2\"}]";
        assert_eq!(extract_first_json(content), Some(content));
    }

    #[test]
    fn test_extract_handles_braces_in_strings() {
        let content = r#"{"text": "a } inside", "n": 1}"#;
        assert_eq!(extract_first_json(content), Some(content));
    }

    #[test]
    fn test_extract_handles_escaped_quotes() {
        let content = r#"{"text": "quote \" and } brace"}"#;
        assert_eq!(extract_first_json(content), Some(content));
    }

    #[test]
    fn test_extract_none_for_plain_prose() {
        assert_eq!(extract_first_json("no json here"), None);
    }

    #[test]
    fn test_extract_none_for_unbalanced() {
        assert_eq!(extract_first_json(r#"{"a": [1, 2"#), None);
    }

    #[test]
    fn test_parse_json_valid() {
        let content = "```json\n{\"needs_documents\": true, \"reasoning\": \"financial data\"}\n```";
        let parsed: Sample = parse_json(content).unwrap_or_else(|_| unreachable!());
        assert!(parsed.needs_documents);
        assert_eq!(parsed.reasoning, "financial data");
    }

    #[test]
    fn test_parse_json_schema_mismatch() {
        let result: Result<Sample, _> = parse_json(r#"{"unexpected": 1}"#);
        assert!(matches!(result, Err(AgentError::ResponseParse { .. })));
    }

    #[test]
    fn test_parse_json_no_value() {
        let result: Result<Sample, _> = parse_json("garbled output");
        let Err(AgentError::ResponseParse { message, .. }) = result else {
            unreachable!("expected parse error");
        };
        assert!(message.contains("no JSON value"));
    }
}
