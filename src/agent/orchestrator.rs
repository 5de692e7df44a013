//! Top-level agent orchestration.
//!
//! Coordinates the full query pipeline: conversation context processing,
//! query reformulation and classification, adaptive task planning, per-task
//! vision page selection and analysis, and final synthesis.
//!
//! Tasks within a plan run strictly sequentially: the planner revises the
//! plan between tasks, which is only meaningful when each task's result is
//! available before the next one is chosen. Independent queries may run
//! concurrently; all per-query state lives on the stack of `process_query`.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::classifier::QueryClassifier;
use super::config::PixieConfig;
use super::context::ContextProcessor;
use super::executor::TaskExecutor;
use super::message::ConversationMessage;
use super::planner::TaskPlanner;
use super::prompt::PromptSet;
use super::provider::Provider;
use super::reformulator::QueryReformulator;
use super::retry::{ProviderSession, RetryPolicy};
use super::selector::VisionPageSelector;
use super::synthesizer::ResponseSynthesizer;
use super::task::{FailureKind, QueryResult, TaskResult};
use crate::document::Page;
use crate::error::AgentError;
use crate::storage::DocumentStore;

/// Upper bound on accepted query length.
const MAX_QUERY_LEN: usize = 10_000;

/// Adaptive document agent.
///
/// Holds the provider, storage, and the pipeline components. One agent
/// serves many queries; each call to [`PixieAgent::process_query`] is
/// independent and safe to run concurrently with others.
pub struct PixieAgent {
    provider: Arc<dyn Provider>,
    storage: Arc<dyn DocumentStore>,
    config: PixieConfig,
    context_processor: ContextProcessor,
    reformulator: QueryReformulator,
    classifier: QueryClassifier,
    planner: TaskPlanner,
    selector: VisionPageSelector,
    executor: TaskExecutor,
    synthesizer: ResponseSynthesizer,
}

impl PixieAgent {
    /// Creates an agent with the given provider, storage, and configuration.
    ///
    /// Loads prompt templates from the directory in
    /// [`PixieConfig::prompt_dir`], falling back to compiled-in defaults.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        storage: Arc<dyn DocumentStore>,
        config: PixieConfig,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            context_processor: ContextProcessor::new(&config, prompts.summary.clone()),
            reformulator: QueryReformulator::new(&config, prompts.reformulator.clone()),
            classifier: QueryClassifier::new(&config, prompts.classifier.clone()),
            planner: TaskPlanner::new(&config, prompts.planner.clone()),
            selector: VisionPageSelector::new(&config, prompts.selector.clone()),
            executor: TaskExecutor::new(&config, prompts.analyst.clone()),
            synthesizer: ResponseSynthesizer::new(&config, prompts.synthesis),
            provider,
            storage,
            config,
        }
    }

    /// Processes a query without external cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for an empty or oversized
    /// query. Other pipeline failures are captured inside the returned
    /// [`QueryResult`] (failed tasks, machine-readable failure answers).
    pub async fn process_query(
        &self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<QueryResult, AgentError> {
        self.process_query_with_cancel(query, history, CancellationToken::new())
            .await
    }

    /// Processes a query with a caller-supplied cancellation token.
    ///
    /// Cancellation stops new provider calls and aborts in-flight ones.
    /// When at least one task has completed, the partial result is
    /// returned with a machine-readable `[canceled]` answer; otherwise the
    /// call resolves to [`AgentError::Canceled`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] for an empty or oversized
    /// query, and [`AgentError::Canceled`] when canceled before any task
    /// completed.
    pub async fn process_query_with_cancel(
        &self,
        query: &str,
        history: &[ConversationMessage],
        cancel: CancellationToken,
    ) -> Result<QueryResult, AgentError> {
        if query.trim().is_empty() {
            return Err(AgentError::Orchestration {
                message: "Query cannot be empty".to_string(),
            });
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(AgentError::Orchestration {
                message: format!(
                    "Query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    query.len()
                ),
            });
        }

        let started = Instant::now();
        let session = ProviderSession::new(
            self.provider.as_ref(),
            RetryPolicy::from_config(&self.config),
            cancel,
        );

        info!(provider = session.provider_name(), "processing query");

        // Steps 1-2: conversation context and reformulation.
        let rquery = match self.prepare_query(&session, query, history).await {
            Ok(rquery) => rquery,
            Err(e) => return Self::fatal_result(e, query, Vec::new(), Vec::new(), 0, started),
        };

        // Step 3: classification, with a direct-answer short circuit.
        let classification = match self.classifier.classify(&session, &rquery).await {
            Ok(classification) => classification,
            Err(e) => return Self::fatal_result(e, query, Vec::new(), Vec::new(), 0, started),
        };
        if !classification.needs_documents {
            let answer = classification.direct_answer.unwrap_or_else(|| {
                format!(
                    "This query doesn't require document analysis. {}",
                    classification.reasoning
                )
            });
            return Ok(Self::result(query, answer, Vec::new(), Vec::new(), 0, started));
        }

        // Step 4: the document catalog.
        let catalog = match self.storage.list_documents().await {
            Ok(catalog) => catalog,
            Err(e) => return Self::fatal_result(e, query, Vec::new(), Vec::new(), 0, started),
        };
        if catalog.is_empty() {
            warn!("no documents available for analysis");
            let answer =
                "I don't have any documents to analyze. Please add some documents first."
                    .to_string();
            return Ok(Self::result(query, answer, Vec::new(), Vec::new(), 0, started));
        }

        // Step 5: initial plan.
        let mut plan = match self
            .planner
            .create_initial_plan(&session, &rquery, &catalog)
            .await
        {
            Ok(plan) => plan,
            Err(e) => return Self::fatal_result(e, query, Vec::new(), Vec::new(), 0, started),
        };

        // Step 6: sequential adaptive execution.
        let mut results: Vec<TaskResult> = Vec::new();
        let mut iterations: usize = 0;

        while plan.has_pending() && iterations < self.config.max_agent_iterations {
            let Some(idx) = plan.next_pending_index() else {
                break;
            };
            plan.tasks[idx].start();
            let task = plan.tasks[idx].clone();
            info!(iteration = iterations + 1, task = %task.name, "executing task");

            let outcome = self.execute_task(&session, &rquery, &task).await;
            iterations += 1;
            plan.current_iteration = iterations;

            let findings = match outcome {
                Ok((pages, analysis)) => {
                    plan.tasks[idx].complete();
                    info!(
                        task = %task.name,
                        pages = pages.len(),
                        "task completed"
                    );
                    let excerpt = analysis.clone();
                    results.push(TaskResult {
                        task: plan.tasks[idx].clone(),
                        selected_pages: pages,
                        analysis,
                    });
                    excerpt
                }
                Err(e) if e.is_pipeline_fatal() => {
                    plan.tasks[idx].fail(FailureKind::from_error(&e));
                    let failed = plan.failed_tasks().into_iter().cloned().collect();
                    return Self::fatal_result(e, query, results, failed, iterations, started);
                }
                Err(e) => {
                    let kind = FailureKind::from_error(&e);
                    warn!(task = %task.name, error = %e, %kind, "task failed");
                    plan.tasks[idx].fail(kind);
                    format!("Task failed: {e}")
                }
            };

            // Step 7: adaptive replanning between tasks.
            if plan.has_pending() {
                let finished = plan.tasks[idx].clone();
                if let Err(e) = self
                    .planner
                    .update_plan(&session, &mut plan, &finished, &findings, &catalog)
                    .await
                {
                    let failed = plan.failed_tasks().into_iter().cloned().collect();
                    return Self::fatal_result(e, query, results, failed, iterations, started);
                }
            }
        }

        if plan.has_pending() {
            info!(
                pending = plan.pending_count(),
                iterations, "iteration budget reached with tasks pending"
            );
        }

        // Step 8: synthesis over whatever completed.
        let failed = plan.failed_tasks();
        let answer = match self
            .synthesizer
            .synthesize(&session, query, &rquery, &results, &failed)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                let failed = plan.failed_tasks().into_iter().cloned().collect();
                return Self::fatal_result(e, query, results, failed, iterations, started);
            }
        };

        info!(
            iterations,
            tasks_completed = results.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "query processed"
        );
        Ok(Self::result(
            query,
            answer,
            results,
            plan.failed_tasks().into_iter().cloned().collect(),
            iterations,
            started,
        ))
    }

    /// Resolves the query to process: reformulated against conversation
    /// context when a history exists, the original otherwise.
    async fn prepare_query(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<String, AgentError> {
        if history.is_empty() {
            return Ok(query.to_string());
        }
        let (context, _recent) = self.context_processor.process(session, history).await?;
        if context.is_empty() {
            return Ok(query.to_string());
        }
        self.reformulator.reformulate(session, query, &context).await
    }

    /// Executes one task: resolve its document, select pages, analyze.
    async fn execute_task(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        task: &super::task::AgentTask,
    ) -> Result<(Vec<Page>, String), AgentError> {
        let document = self
            .storage
            .get_document(&task.document_id)
            .await?
            .ok_or_else(|| AgentError::DocumentNotFound {
                id: task.document_id.clone(),
            })?;

        let pages = self.selector.select_pages(session, task, &document.pages).await?;
        let analysis = self.executor.analyze(session, query, task, &pages).await?;
        Ok((pages, analysis))
    }

    /// Builds the final result, aggregating selected pages in
    /// first-occurrence order across task results.
    fn result(
        query: &str,
        answer: String,
        task_results: Vec<TaskResult>,
        failed_tasks: Vec<super::task::AgentTask>,
        iterations: usize,
        started: Instant,
    ) -> QueryResult {
        let selected_pages = Self::unique_pages(&task_results);
        QueryResult {
            query: query.to_string(),
            answer,
            selected_pages,
            task_results,
            failed_tasks,
            iterations,
            elapsed: started.elapsed(),
        }
    }

    /// Maps a pipeline-fatal error to the documented outcome: cancellation
    /// with no completed work surfaces as an error, anything else becomes
    /// a result whose answer is a machine-readable failure string.
    fn fatal_result(
        error: AgentError,
        query: &str,
        task_results: Vec<TaskResult>,
        failed_tasks: Vec<super::task::AgentTask>,
        iterations: usize,
        started: Instant,
    ) -> Result<QueryResult, AgentError> {
        match error {
            AgentError::Canceled if task_results.is_empty() => Err(AgentError::Canceled),
            AgentError::Canceled => {
                let answer = format!(
                    "[canceled] query canceled after {} completed task(s)",
                    task_results.len()
                );
                Ok(Self::result(
                    query,
                    answer,
                    task_results,
                    failed_tasks,
                    iterations,
                    started,
                ))
            }
            e => {
                let answer = format!("[error] {e}");
                Ok(Self::result(
                    query,
                    answer,
                    task_results,
                    failed_tasks,
                    iterations,
                    started,
                ))
            }
        }
    }

    /// Unique pages across task results, keyed by image path, preserving
    /// first-occurrence order.
    fn unique_pages(task_results: &[TaskResult]) -> Vec<Page> {
        let mut seen = std::collections::HashSet::new();
        let mut pages = Vec::new();
        for result in task_results {
            for page in &result.selected_pages {
                if seen.insert(page.image_path.clone()) {
                    pages.push(page.clone());
                }
            }
        }
        pages
    }
}

impl std::fmt::Debug for PixieAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixieAgent")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
