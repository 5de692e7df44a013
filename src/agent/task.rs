//! Task, plan, and result types for the adaptive agent.
//!
//! A plan is an ordered collection of tasks for one query, each bound to
//! exactly one document. Task status only advances along
//! pending → `in_progress` → {completed, failed}; the accessors here enforce
//! that and the plan-level mutation rules (only pending tasks may be
//! removed or edited).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Page;
use crate::error::AgentError;

/// Lifecycle state of an agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished with an analysis.
    Completed,
    /// Finished with an error.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Structural classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or invalid credentials.
    Auth,
    /// Retriable provider failure that exhausted its retry budget.
    ProviderTransient,
    /// Non-retriable provider failure (malformed request, unreadable image).
    ProviderFatal,
    /// Model output did not match the expected schema.
    Parse,
    /// The task's assigned document could not be resolved.
    StorageNotFound,
    /// The query was canceled mid-task.
    Canceled,
}

impl FailureKind {
    /// Maps a pipeline error to its failure classification.
    #[must_use]
    pub const fn from_error(error: &AgentError) -> Self {
        match error {
            AgentError::Auth { .. } | AgentError::ApiKeyMissing => Self::Auth,
            AgentError::RateLimited { .. }
            | AgentError::Transient { .. }
            | AgentError::Timeout { .. } => Self::ProviderTransient,
            AgentError::ResponseParse { .. } => Self::Parse,
            AgentError::DocumentNotFound { .. } => Self::StorageNotFound,
            AgentError::Canceled => Self::Canceled,
            _ => Self::ProviderFatal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::ProviderTransient => write!(f, "provider_transient"),
            Self::ProviderFatal => write!(f, "provider_fatal"),
            Self::Parse => write!(f, "parse"),
            Self::StorageNotFound => write!(f, "storage_not_found"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// A focused sub-question bound to exactly one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique task identifier.
    pub id: String,
    /// Short task name.
    pub name: String,
    /// What information this task should find.
    pub description: String,
    /// The single document this task analyzes.
    pub document_id: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Failure classification when `status` is [`TaskStatus::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl AgentTask {
    /// Creates a pending task with a fresh id.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            document_id: document_id.into(),
            status: TaskStatus::Pending,
            failure: None,
        }
    }

    /// Advances a pending task to in-progress. Returns `false` otherwise.
    pub fn start(&mut self) -> bool {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::InProgress;
            true
        } else {
            false
        }
    }

    /// Advances an in-progress task to completed. Returns `false` otherwise.
    pub fn complete(&mut self) -> bool {
        if self.status == TaskStatus::InProgress {
            self.status = TaskStatus::Completed;
            true
        } else {
            false
        }
    }

    /// Advances an in-progress task to failed with a classification.
    /// Returns `false` otherwise.
    pub fn fail(&mut self, kind: FailureKind) -> bool {
        if self.status == TaskStatus::InProgress {
            self.status = TaskStatus::Failed;
            self.failure = Some(kind);
            true
        } else {
            false
        }
    }
}

/// The agent's plan for a single query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// The query this plan answers (post-reformulation).
    pub initial_query: String,
    /// Ordered tasks.
    pub tasks: Vec<AgentTask>,
    /// Completed (or failed) task cycles so far.
    pub current_iteration: usize,
}

impl TaskPlan {
    /// Creates a plan with iteration zero.
    #[must_use]
    pub fn new(initial_query: impl Into<String>, tasks: Vec<AgentTask>) -> Self {
        Self {
            initial_query: initial_query.into(),
            tasks,
            current_iteration: 0,
        }
    }

    /// Whether any task is still pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Pending)
    }

    /// Index of the first pending task in plan order.
    #[must_use]
    pub fn next_pending_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.status == TaskStatus::Pending)
    }

    /// Appends a task to the plan.
    pub fn add_task(&mut self, task: AgentTask) {
        self.tasks.push(task);
    }

    /// Removes a pending task by id. Completed and in-progress tasks are
    /// immutable; attempting to remove them is a no-op.
    pub fn remove_pending(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks
            .retain(|t| t.id != task_id || t.status != TaskStatus::Pending);
        self.tasks.len() < before
    }

    /// Removes every pending task, leaving executed tasks in place.
    pub fn clear_pending(&mut self) {
        self.tasks.retain(|t| t.status != TaskStatus::Pending);
    }

    /// All completed tasks in plan order.
    #[must_use]
    pub fn completed_tasks(&self) -> Vec<&AgentTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect()
    }

    /// All failed tasks in plan order.
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<&AgentTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }
}

/// The outcome of executing a single task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    /// Snapshot of the task at completion.
    pub task: AgentTask,
    /// Pages the selector chose for this task, in selection order.
    /// Every page belongs to the task's assigned document.
    pub selected_pages: Vec<Page>,
    /// The model's analysis for this task.
    pub analysis: String,
}

impl TaskResult {
    /// Number of pages analyzed for this task.
    #[must_use]
    pub fn pages_analyzed(&self) -> usize {
        self.selected_pages.len()
    }
}

/// Final result of processing a query through the agent pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// The user's original query.
    pub query: String,
    /// The synthesized answer (or a machine-readable failure string).
    pub answer: String,
    /// Union of all task selections in first-occurrence order.
    pub selected_pages: Vec<Page>,
    /// Per-task results for completed tasks, in execution order.
    pub task_results: Vec<TaskResult>,
    /// Snapshots of failed tasks with their failure kinds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_tasks: Vec<AgentTask>,
    /// Task cycles consumed.
    pub iterations: usize,
    /// Wall-clock processing time.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> AgentTask {
        AgentTask::new(name, format!("find {name}"), "d1")
    }

    #[test]
    fn test_status_advances_monotonically() {
        let mut t = task("t1");
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.start());
        assert_eq!(t.status, TaskStatus::InProgress);
        assert!(t.complete());
        assert_eq!(t.status, TaskStatus::Completed);

        // No transition out of a terminal state.
        assert!(!t.start());
        assert!(!t.fail(FailureKind::Parse));
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn test_fail_records_kind() {
        let mut t = task("t1");
        assert!(t.start());
        assert!(t.fail(FailureKind::ProviderTransient));
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.failure, Some(FailureKind::ProviderTransient));
        assert!(!t.complete());
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut t = task("t1");
        assert!(!t.complete());
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn test_next_pending_in_plan_order() {
        let mut plan = TaskPlan::new("q", vec![task("a"), task("b")]);
        assert_eq!(plan.next_pending_index(), Some(0));
        plan.tasks[0].start();
        plan.tasks[0].complete();
        assert_eq!(plan.next_pending_index(), Some(1));
        plan.tasks[1].start();
        assert_eq!(plan.next_pending_index(), None);
        assert!(!plan.has_pending());
    }

    #[test]
    fn test_remove_pending_only() {
        let mut plan = TaskPlan::new("q", vec![task("a"), task("b")]);
        plan.tasks[0].start();
        let executing_id = plan.tasks[0].id.clone();
        let pending_id = plan.tasks[1].id.clone();

        assert!(!plan.remove_pending(&executing_id));
        assert!(plan.remove_pending(&pending_id));
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn test_clear_pending_keeps_executed() {
        let mut plan = TaskPlan::new("q", vec![task("a"), task("b"), task("c")]);
        plan.tasks[0].start();
        plan.tasks[0].complete();
        plan.clear_pending();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.completed_tasks().len(), 1);
        assert_eq!(plan.pending_count(), 0);
    }

    #[test]
    fn test_failure_kind_from_error() {
        assert_eq!(
            FailureKind::from_error(&AgentError::RateLimited {
                message: "429".to_string()
            }),
            FailureKind::ProviderTransient
        );
        assert_eq!(
            FailureKind::from_error(&AgentError::Timeout {
                message: "60s".to_string()
            }),
            FailureKind::ProviderTransient
        );
        assert_eq!(
            FailureKind::from_error(&AgentError::DocumentNotFound {
                id: "d9".to_string()
            }),
            FailureKind::StorageNotFound
        );
        assert_eq!(
            FailureKind::from_error(&AgentError::BadRequest {
                message: "bad".to_string()
            }),
            FailureKind::ProviderFatal
        );
        assert_eq!(
            FailureKind::from_error(&AgentError::Canceled),
            FailureKind::Canceled
        );
    }

    #[test]
    fn test_query_result_serializes_elapsed_as_seconds() {
        let result = QueryResult {
            query: "q".to_string(),
            answer: "a".to_string(),
            selected_pages: Vec::new(),
            task_results: Vec::new(),
            failed_tasks: Vec::new(),
            iterations: 0,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_string(&result).unwrap_or_default();
        assert!(json.contains("\"elapsed\":1.5"));
    }
}
