//! Retry, timeout, and cancellation policy around provider calls.
//!
//! Every model call in the pipeline goes through a [`ProviderSession`],
//! which applies the per-request timeout, retries retriable failures with
//! exponential backoff, and aborts promptly when the query's cancellation
//! token fires. Dropping the in-flight future on cancellation aborts the
//! underlying network operation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::PixieConfig;
use super::message::{ChatRequest, ChatResponse};
use super::provider::Provider;
use crate::error::AgentError;

/// Base delay for exponential backoff between retries.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry and timeout policy for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt for retriable failures.
    pub attempts: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Backoff base delay; attempt `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Builds the policy from agent configuration.
    #[must_use]
    pub const fn from_config(config: &PixieConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            timeout: config.timeout,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

enum CallKind {
    Text,
    Multimodal,
}

/// A provider handle scoped to one query.
///
/// Bundles the provider reference with the query's retry policy and
/// cancellation token so components do not thread them individually.
pub struct ProviderSession<'a> {
    provider: &'a dyn Provider,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<'a> ProviderSession<'a> {
    /// Creates a session for one query.
    #[must_use]
    pub fn new(provider: &'a dyn Provider, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            provider,
            policy,
            cancel,
        }
    }

    /// Name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Executes a text-only call with retry, timeout, and cancellation.
    ///
    /// # Errors
    ///
    /// Returns the final provider error after the retry budget is spent,
    /// [`AgentError::Timeout`] when a single attempt exceeds the configured
    /// timeout, or [`AgentError::Canceled`] when the token fires.
    pub async fn text(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.call(request, &CallKind::Text).await
    }

    /// Executes a multimodal call with retry, timeout, and cancellation.
    ///
    /// # Errors
    ///
    /// Same classification as [`ProviderSession::text`].
    pub async fn multimodal(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.call(request, &CallKind::Multimodal).await
    }

    async fn call(&self, request: &ChatRequest, kind: &CallKind) -> Result<ChatResponse, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Canceled);
            }

            let fut = async {
                match kind {
                    CallKind::Text => self.provider.process_text(request).await,
                    CallKind::Multimodal => self.provider.process_multimodal(request).await,
                }
            };

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return Err(AgentError::Canceled),
                res = tokio::time::timeout(self.policy.timeout, fut) => res,
            };

            let err = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => AgentError::Timeout {
                    message: format!("no response within {}s", self.policy.timeout.as_secs()),
                },
            };

            if !err.is_retriable() || attempt >= self.policy.attempts {
                return Err(err);
            }

            let delay = self.policy.base_delay * 2u32.saturating_pow(attempt);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying provider call"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return Err(AgentError::Canceled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{TokenUsage, user_message};

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Provider that fails the first `failures` calls, then succeeds.
    struct FlakyProvider {
        call_count: AtomicUsize,
        failures: usize,
        error_kind: fn(usize) -> AgentError,
    }

    impl FlakyProvider {
        fn new(failures: usize, error_kind: fn(usize) -> AgentError) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                failures,
                error_kind,
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn process_text(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if count < self.failures {
                Err((self.error_kind)(count))
            } else {
                Ok(ChatResponse {
                    content: "ok".to_string(),
                    usage: TokenUsage::default(),
                    finish_reason: Some("stop".to_string()),
                })
            }
        }

        async fn process_multimodal(
            &self,
            request: &ChatRequest,
        ) -> Result<ChatResponse, AgentError> {
            self.process_text(request).await
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![user_message("q")],
            temperature: Some(0.1),
            max_tokens: Some(64),
            json_mode: false,
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
        }
    }

    fn rate_limited(_: usize) -> AgentError {
        AgentError::RateLimited {
            message: "429".to_string(),
        }
    }

    fn bad_request(_: usize) -> AgentError {
        AgentError::BadRequest {
            message: "bad".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let provider = FlakyProvider::new(2, rate_limited);
        let session = ProviderSession::new(&provider, fast_policy(3), CancellationToken::new());
        let response = session
            .text(&request())
            .await
            .unwrap_or_else(|e| panic!("expected success, got: {e}"));
        assert_eq!(response.content, "ok");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion() {
        // 4 failures against 3 retries: initial + 3 retries all fail.
        let provider = FlakyProvider::new(4, rate_limited);
        let session = ProviderSession::new(&provider, fast_policy(3), CancellationToken::new());
        let result = session.text(&request()).await;
        assert!(matches!(result, Err(AgentError::RateLimited { .. })));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_non_retriable_fails_immediately() {
        let provider = FlakyProvider::new(5, bad_request);
        let session = ProviderSession::new(&provider, fast_policy(3), CancellationToken::new());
        let result = session.text(&request()).await;
        assert!(matches!(result, Err(AgentError::BadRequest { .. })));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let provider = FlakyProvider::new(0, rate_limited);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = ProviderSession::new(&provider, fast_policy(3), cancel);
        let result = session.text(&request()).await;
        assert!(matches!(result, Err(AgentError::Canceled)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        struct StallingProvider;

        #[async_trait]
        impl Provider for StallingProvider {
            fn name(&self) -> &'static str {
                "stalling"
            }

            async fn process_text(
                &self,
                _request: &ChatRequest,
            ) -> Result<ChatResponse, AgentError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("the timeout should fire first")
            }

            async fn process_multimodal(
                &self,
                request: &ChatRequest,
            ) -> Result<ChatResponse, AgentError> {
                self.process_text(request).await
            }
        }

        let provider = StallingProvider;
        let policy = RetryPolicy {
            attempts: 3,
            timeout: Duration::from_millis(20),
            base_delay: Duration::from_millis(1),
        };
        let session = ProviderSession::new(&provider, policy, CancellationToken::new());
        let result = session.text(&request()).await;
        // A timeout consumes the whole request budget and is not retried.
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
    }
}
