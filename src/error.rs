//! Error types for the document agent pipeline.
//!
//! Errors are structural rather than textual: each variant corresponds to a
//! distinct handling policy (retry, fallback, task failure, pipeline abort)
//! so callers can match on the kind instead of inspecting messages.

use thiserror::Error;

/// Errors produced by the agent pipeline and its providers.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the selected provider.
    #[error("no API key configured for provider")]
    ApiKeyMissing,

    /// The configured provider name is not recognized.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// Missing or invalid credentials. Fatal to the whole query.
    #[error("authentication failed: {message}")]
    Auth {
        /// Provider-reported failure detail.
        message: String,
    },

    /// The provider rejected the call due to rate limiting. Retriable.
    #[error("rate limited by provider: {message}")]
    RateLimited {
        /// Provider-reported failure detail.
        message: String,
    },

    /// A transient provider failure (5xx, network error). Retriable.
    #[error("transient provider failure: {message}")]
    Transient {
        /// Provider-reported failure detail.
        message: String,
    },

    /// The provider rejected the request as malformed. Fatal to the call.
    #[error("provider rejected request: {message}")]
    BadRequest {
        /// Provider-reported failure detail.
        message: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("request timed out: {message}")]
    Timeout {
        /// Description of the timeout.
        message: String,
    },

    /// A page image could not be read or encoded for a provider call.
    #[error("failed to read image {path}: {message}")]
    ImageRead {
        /// Path of the image that failed to load.
        path: String,
        /// Underlying I/O failure detail.
        message: String,
    },

    /// Model output did not conform to the expected JSON schema.
    ///
    /// Never fatal: every component that parses model output defines a
    /// deterministic fallback for this case.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// Description of the parse failure.
        message: String,
        /// The raw model output, preserved for diagnostics.
        content: String,
    },

    /// An assigned document id could not be resolved in storage.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// The unresolvable document id.
        id: String,
    },

    /// A value failed construction-time validation.
    #[error("invalid value: {message}")]
    Validation {
        /// Description of the rejected value.
        message: String,
    },

    /// The query was canceled by the caller.
    #[error("query canceled")]
    Canceled,

    /// Pipeline-level failure outside any single provider call.
    #[error("orchestration failed: {message}")]
    Orchestration {
        /// Description of the failure.
        message: String,
    },
}

impl AgentError {
    /// Whether this error should be retried with backoff.
    ///
    /// Only rate limits and transient provider failures are retriable;
    /// a timeout already consumed the full request budget and fails the
    /// call directly.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Whether this error aborts the whole query rather than one task.
    #[must_use]
    pub const fn is_pipeline_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_kinds() {
        assert!(
            AgentError::RateLimited {
                message: "429".to_string()
            }
            .is_retriable()
        );
        assert!(
            AgentError::Transient {
                message: "503".to_string()
            }
            .is_retriable()
        );
        assert!(
            !AgentError::Timeout {
                message: "60s".to_string()
            }
            .is_retriable()
        );
        assert!(
            !AgentError::BadRequest {
                message: "bad".to_string()
            }
            .is_retriable()
        );
        assert!(!AgentError::Canceled.is_retriable());
    }

    #[test]
    fn test_pipeline_fatal_kinds() {
        assert!(
            AgentError::Auth {
                message: "invalid key".to_string()
            }
            .is_pipeline_fatal()
        );
        assert!(AgentError::Canceled.is_pipeline_fatal());
        assert!(
            !AgentError::RateLimited {
                message: "429".to_string()
            }
            .is_pipeline_fatal()
        );
        assert!(
            !AgentError::DocumentNotFound {
                id: "d1".to_string()
            }
            .is_pipeline_fatal()
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let err = AgentError::DocumentNotFound {
            id: "doc_42".to_string(),
        };
        assert!(err.to_string().contains("doc_42"));
    }
}
