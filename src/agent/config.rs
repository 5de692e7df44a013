//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. Default models follow the selected provider.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default maximum adaptive planning iterations.
const DEFAULT_MAX_AGENT_ITERATIONS: usize = 5;
/// Default maximum pages analyzed per task.
const DEFAULT_MAX_PAGES_PER_TASK: usize = 6;
/// Default maximum tasks in a plan.
const DEFAULT_MAX_TASKS_PER_PLAN: usize = 4;
/// Default conversation turn count before summarization kicks in.
const DEFAULT_MAX_CONVERSATION_TURNS: usize = 8;
/// Default number of older turns folded into the summary.
const DEFAULT_TURNS_TO_SUMMARIZE: usize = 5;
/// Default number of recent turns kept verbatim.
const DEFAULT_TURNS_TO_KEEP_FULL: usize = 3;
/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Default retry attempts for retriable provider failures.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Sampling temperatures for each pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct Temperatures {
    /// Query classification.
    pub classification: f32,
    /// Query reformulation.
    pub reformulation: f32,
    /// Initial planning and plan updates.
    pub planning: f32,
    /// Vision page selection.
    pub selection: f32,
    /// Per-task page analysis.
    pub analysis: f32,
    /// Final response synthesis.
    pub synthesis: f32,
    /// Conversation summarization.
    pub summary: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            classification: 0.1,
            reformulation: 0.1,
            planning: 0.3,
            selection: 0.1,
            analysis: 0.3,
            synthesis: 0.4,
            summary: 0.2,
        }
    }
}

/// Configuration for the document agent.
#[derive(Debug, Clone)]
pub struct PixieConfig {
    /// Provider name (`"openai"`, `"anthropic"`, or `"openrouter"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for text-only calls.
    pub text_model: String,
    /// Model for multimodal (vision) calls.
    pub vision_model: String,
    /// Maximum adaptive planning iterations per query.
    pub max_agent_iterations: usize,
    /// Maximum pages analyzed per task.
    pub max_pages_per_task: usize,
    /// Maximum tasks held in a plan at any time.
    pub max_tasks_per_plan: usize,
    /// Conversation turn count that triggers summarization.
    pub max_conversation_turns: usize,
    /// Number of older turns folded into the summary.
    pub turns_to_summarize: usize,
    /// Number of recent turns kept verbatim.
    pub turns_to_keep_full: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry attempts for retriable provider failures.
    pub retry_attempts: u32,
    /// Include stored page summaries in selection prompts when present.
    pub include_page_summaries_in_selection: bool,
    /// Per-stage sampling temperatures.
    pub temperatures: Temperatures,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts load from markdown files in this directory,
    /// falling back to compiled-in defaults for any missing files.
    pub prompt_dir: Option<PathBuf>,
}

impl PixieConfig {
    /// Creates a new builder for `PixieConfig`.
    #[must_use]
    pub fn builder() -> PixieConfigBuilder {
        PixieConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found for the
    /// selected provider.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Default text and vision models for each provider.
fn default_models(provider: &str) -> (&'static str, &'static str) {
    match provider {
        "anthropic" => ("claude-3-opus-20240229", "claude-3-opus-20240229"),
        "openrouter" => ("openai/gpt-4o", "openai/gpt-4o"),
        _ => ("gpt-4o", "gpt-4o"),
    }
}

/// Environment variable holding the API key for each provider.
fn api_key_env(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "ANTHROPIC_API_KEY",
        "openrouter" => "OPENROUTER_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// Builder for [`PixieConfig`].
#[derive(Debug, Clone, Default)]
pub struct PixieConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    text_model: Option<String>,
    vision_model: Option<String>,
    max_agent_iterations: Option<usize>,
    max_pages_per_task: Option<usize>,
    max_tasks_per_plan: Option<usize>,
    max_conversation_turns: Option<usize>,
    turns_to_summarize: Option<usize>,
    turns_to_keep_full: Option<usize>,
    timeout: Option<Duration>,
    retry_attempts: Option<u32>,
    include_page_summaries_in_selection: Option<bool>,
    temperatures: Option<Temperatures>,
    prompt_dir: Option<PathBuf>,
}

impl PixieConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DOCPIXIE_PROVIDER").ok();
        }
        let provider = self.provider.as_deref().unwrap_or("openai").to_string();
        if self.api_key.is_none() {
            self.api_key = std::env::var(api_key_env(&provider))
                .or_else(|_| std::env::var("DOCPIXIE_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("DOCPIXIE_BASE_URL").ok();
        }
        if self.text_model.is_none() {
            self.text_model = std::env::var("DOCPIXIE_TEXT_MODEL").ok();
        }
        if self.vision_model.is_none() {
            self.vision_model = std::env::var("DOCPIXIE_VISION_MODEL").ok();
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("DOCPIXIE_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the text model.
    #[must_use]
    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = Some(model.into());
        self
    }

    /// Sets the vision model.
    #[must_use]
    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = Some(model.into());
        self
    }

    /// Sets the maximum adaptive planning iterations.
    #[must_use]
    pub const fn max_agent_iterations(mut self, n: usize) -> Self {
        self.max_agent_iterations = Some(n);
        self
    }

    /// Sets the maximum pages per task.
    #[must_use]
    pub const fn max_pages_per_task(mut self, n: usize) -> Self {
        self.max_pages_per_task = Some(n);
        self
    }

    /// Sets the maximum tasks per plan.
    #[must_use]
    pub const fn max_tasks_per_plan(mut self, n: usize) -> Self {
        self.max_tasks_per_plan = Some(n);
        self
    }

    /// Sets the conversation turn count that triggers summarization.
    #[must_use]
    pub const fn max_conversation_turns(mut self, n: usize) -> Self {
        self.max_conversation_turns = Some(n);
        self
    }

    /// Sets the number of older turns folded into the summary.
    #[must_use]
    pub const fn turns_to_summarize(mut self, n: usize) -> Self {
        self.turns_to_summarize = Some(n);
        self
    }

    /// Sets the number of recent turns kept verbatim.
    #[must_use]
    pub const fn turns_to_keep_full(mut self, n: usize) -> Self {
        self.turns_to_keep_full = Some(n);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the retry attempts for retriable failures.
    #[must_use]
    pub const fn retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = Some(n);
        self
    }

    /// Sets whether selection prompts include stored page summaries.
    #[must_use]
    pub const fn include_page_summaries_in_selection(mut self, include: bool) -> Self {
        self.include_page_summaries_in_selection = Some(include);
        self
    }

    /// Sets the per-stage sampling temperatures.
    #[must_use]
    pub const fn temperatures(mut self, temperatures: Temperatures) -> Self {
        self.temperatures = Some(temperatures);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`PixieConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<PixieConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;
        let provider = self.provider.unwrap_or_else(|| "openai".to_string());
        let (default_text, default_vision) = default_models(&provider);

        Ok(PixieConfig {
            api_key,
            base_url: self.base_url,
            text_model: self
                .text_model
                .unwrap_or_else(|| default_text.to_string()),
            vision_model: self
                .vision_model
                .unwrap_or_else(|| default_vision.to_string()),
            max_agent_iterations: self
                .max_agent_iterations
                .unwrap_or(DEFAULT_MAX_AGENT_ITERATIONS),
            max_pages_per_task: self.max_pages_per_task.unwrap_or(DEFAULT_MAX_PAGES_PER_TASK),
            max_tasks_per_plan: self.max_tasks_per_plan.unwrap_or(DEFAULT_MAX_TASKS_PER_PLAN),
            max_conversation_turns: self
                .max_conversation_turns
                .unwrap_or(DEFAULT_MAX_CONVERSATION_TURNS),
            turns_to_summarize: self.turns_to_summarize.unwrap_or(DEFAULT_TURNS_TO_SUMMARIZE),
            turns_to_keep_full: self.turns_to_keep_full.unwrap_or(DEFAULT_TURNS_TO_KEEP_FULL),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            retry_attempts: self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            include_page_summaries_in_selection: self
                .include_page_summaries_in_selection
                .unwrap_or(true),
            temperatures: self.temperatures.unwrap_or_default(),
            prompt_dir: self.prompt_dir,
            provider,
        })
    }
}
