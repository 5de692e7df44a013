//! Adaptive task planning.
//!
//! The planner creates an initial plan of focused tasks, each bound to
//! exactly one document from the catalog, and revises the plan between
//! task executions as findings arrive. Plans are bounded by
//! `max_tasks_per_plan` at all times and only pending tasks are mutable.

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::config::PixieConfig;
use super::json;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::{build_plan_update_prompt, build_planning_prompt};
use super::retry::ProviderSession;
use super::task::{AgentTask, TaskPlan};
use crate::error::AgentError;
use crate::storage::DocumentInfo;

/// Maximum tokens for planning and plan-update calls.
const PLANNING_MAX_TOKENS: u32 = 500;

/// A task as proposed by the model.
///
/// `document_id` is kept as a raw JSON value so a malformed assignment
/// (an array of ids, a number) invalidates only that task, not the whole
/// plan.
#[derive(Debug, Deserialize)]
struct ProposedTask {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "document")]
    document_id: serde_json::Value,
}

/// One edit proposed by the model during a plan update.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PlanEdit {
    /// Leave the plan unchanged.
    Keep,
    /// Gathered information already answers the query; drop pending tasks.
    Sufficient,
    /// Remove a pending task.
    Remove { task_id: String },
    /// Refocus a pending task.
    Modify {
        task_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    /// Append a new task.
    Add { task: ProposedTask },
}

/// Creates and adaptively revises task plans.
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    model: String,
    max_tasks: usize,
    temperature: f32,
    system_prompt: String,
}

impl TaskPlanner {
    /// Creates a planner from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &PixieConfig, system_prompt: String) -> Self {
        Self {
            model: config.text_model.clone(),
            max_tasks: config.max_tasks_per_plan,
            temperature: config.temperatures.planning,
            system_prompt,
        }
    }

    /// Creates the initial task plan for a query.
    ///
    /// Tasks referring to unknown documents are dropped; if the first
    /// response contains any invalid task (or none at all) the planning
    /// call is re-issued once. When no valid task survives, a
    /// deterministic fallback plan with one task per catalog document is
    /// used. The plan is truncated to `max_tasks_per_plan` in all cases.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn create_initial_plan(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        catalog: &[DocumentInfo],
    ) -> Result<TaskPlan, AgentError> {
        let mut tasks = match self.request_tasks(session, query, catalog).await? {
            Some((tasks, invalid)) if invalid == 0 && !tasks.is_empty() => tasks,
            first_attempt => {
                debug!("initial plan invalid or incomplete, re-requesting once");
                match self.request_tasks(session, query, catalog).await? {
                    Some((tasks, _)) if !tasks.is_empty() => tasks,
                    _ => first_attempt.map(|(tasks, _)| tasks).unwrap_or_default(),
                }
            }
        };

        if tasks.is_empty() {
            warn!("no valid tasks from planner, falling back to one task per document");
            tasks = Self::fallback_tasks(catalog);
        }

        tasks.truncate(self.max_tasks);
        info!(task_count = tasks.len(), "created initial task plan");
        Ok(TaskPlan::new(query, tasks))
    }

    /// Revises the plan after a task finishes.
    ///
    /// Applies the model's suggested edits under the plan mutation rules:
    /// completed and in-progress tasks are immutable, removals are applied
    /// before modifications and additions, at most one task is appended,
    /// and the plan never exceeds `max_tasks_per_plan`. A `sufficient`
    /// verdict drops all pending tasks. Any parse failure or non-fatal
    /// provider error leaves the plan unchanged.
    ///
    /// # Errors
    ///
    /// Only pipeline-fatal errors ([`AgentError::Auth`],
    /// [`AgentError::Canceled`]) propagate.
    pub async fn update_plan(
        &self,
        session: &ProviderSession<'_>,
        plan: &mut TaskPlan,
        completed_task: &AgentTask,
        findings: &str,
        catalog: &[DocumentInfo],
    ) -> Result<(), AgentError> {
        // Limit findings passed to the planner; full analyses can be long.
        let excerpt = truncate_chars(findings, 500);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_plan_update_prompt(
                    &plan.initial_query,
                    catalog,
                    plan,
                    completed_task,
                    &excerpt,
                )),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(PLANNING_MAX_TOKENS),
            json_mode: true,
        };

        let response = match session.text(&request).await {
            Ok(response) => response,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "plan update call failed, keeping plan unchanged");
                return Ok(());
            }
        };

        match Self::parse_edits(&response.content) {
            Ok(edits) => self.apply_edits(plan, edits, catalog),
            Err(e) => {
                warn!(error = %e, "failed to parse plan update, keeping plan unchanged");
            }
        }
        Ok(())
    }

    async fn request_tasks(
        &self,
        session: &ProviderSession<'_>,
        query: &str,
        catalog: &[DocumentInfo],
    ) -> Result<Option<(Vec<AgentTask>, usize)>, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.system_prompt),
                user_message(&build_planning_prompt(query, catalog, self.max_tasks)),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(PLANNING_MAX_TOKENS),
            json_mode: true,
        };

        let response = match session.text(&request).await {
            Ok(response) => response,
            Err(e) if e.is_pipeline_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "planning call failed");
                return Ok(None);
            }
        };

        Ok(Self::parse_tasks(&response.content, catalog))
    }

    /// Parses proposed tasks from model output.
    ///
    /// Accepts either a top-level array or a `{"tasks": [...]}` wrapper.
    /// Returns the valid tasks and the number of proposals dropped for an
    /// unknown or malformed document assignment, or `None` when the output
    /// holds no task list at all.
    fn parse_tasks(content: &str, catalog: &[DocumentInfo]) -> Option<(Vec<AgentTask>, usize)> {
        let proposals: Vec<ProposedTask> = match json::parse_json::<Vec<ProposedTask>>(content) {
            Ok(list) => list,
            Err(_) => {
                #[derive(Deserialize)]
                struct Wrapper {
                    tasks: Vec<ProposedTask>,
                }
                match json::parse_json::<Wrapper>(content) {
                    Ok(wrapper) => wrapper.tasks,
                    Err(e) => {
                        warn!(error = %e, "failed to parse task plan");
                        return None;
                    }
                }
            }
        };

        let mut valid = Vec::new();
        let mut invalid = 0;
        for proposal in proposals {
            match Self::validate_proposal(&proposal, catalog) {
                Some(task) => valid.push(task),
                None => {
                    invalid += 1;
                    debug!(
                        name = %proposal.name,
                        document = %proposal.document_id,
                        "dropping task with invalid document assignment"
                    );
                }
            }
        }
        Some((valid, invalid))
    }

    /// Validates a proposed task: its document assignment must be a single
    /// id present in the catalog.
    fn validate_proposal(proposal: &ProposedTask, catalog: &[DocumentInfo]) -> Option<AgentTask> {
        let document_id = proposal.document_id.as_str()?;
        if !catalog.iter().any(|d| d.id == document_id) {
            return None;
        }
        let name = if proposal.name.trim().is_empty() {
            "Unnamed task".to_string()
        } else {
            proposal.name.trim().to_string()
        };
        let description = if proposal.description.trim().is_empty() {
            name.clone()
        } else {
            proposal.description.trim().to_string()
        };
        Some(AgentTask::new(name, description, document_id))
    }

    /// Deterministic fallback: one generic task per catalog document.
    fn fallback_tasks(catalog: &[DocumentInfo]) -> Vec<AgentTask> {
        catalog
            .iter()
            .map(|doc| {
                AgentTask::new(
                    format!("Analyze {}", doc.name),
                    "Find information relevant to the user's query".to_string(),
                    doc.id.clone(),
                )
            })
            .collect()
    }

    /// Parses plan-update edits: a single edit object or an array of them.
    fn parse_edits(content: &str) -> Result<Vec<PlanEdit>, AgentError> {
        json::parse_json::<Vec<PlanEdit>>(content)
            .or_else(|_| json::parse_json::<PlanEdit>(content).map(|edit| vec![edit]))
    }

    /// Applies edits under the plan mutation rules.
    fn apply_edits(&self, plan: &mut TaskPlan, edits: Vec<PlanEdit>, catalog: &[DocumentInfo]) {
        if edits.iter().any(|e| matches!(e, PlanEdit::Sufficient)) {
            info!("planner reports gathered information is sufficient, dropping pending tasks");
            plan.clear_pending();
            return;
        }

        // Removals win over additions, so apply them first.
        for edit in &edits {
            if let PlanEdit::Remove { task_id } = edit
                && plan.remove_pending(task_id)
            {
                info!(task_id = %task_id, "removed pending task");
            }
        }

        for edit in &edits {
            if let PlanEdit::Modify {
                task_id,
                name,
                description,
            } = edit
                && let Some(task) = plan
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == *task_id && t.status == super::task::TaskStatus::Pending)
            {
                if let Some(name) = name
                    && !name.trim().is_empty()
                {
                    task.name = name.trim().to_string();
                }
                if let Some(description) = description
                    && !description.trim().is_empty()
                {
                    task.description = description.trim().to_string();
                }
                info!(task_id = %task_id, "modified pending task");
            }
        }

        // At most one addition, and never past the plan cap.
        for edit in edits {
            if let PlanEdit::Add { task } = edit {
                if plan.tasks.len() >= self.max_tasks {
                    debug!("ignoring task addition, plan is at capacity");
                } else if let Some(task) = Self::validate_proposal(&task, catalog) {
                    info!(name = %task.name, "appended new task to plan");
                    plan.add_task(task);
                } else {
                    debug!("ignoring task addition with invalid document assignment");
                }
                break;
            }
        }
    }
}

/// Truncates to a character boundary, at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::task::TaskStatus;

    fn catalog() -> Vec<DocumentInfo> {
        vec![
            DocumentInfo {
                id: "d1".to_string(),
                name: "Q3 Report".to_string(),
                summary: Some("Q3 financials".to_string()),
                page_count: 12,
            },
            DocumentInfo {
                id: "d2".to_string(),
                name: "Handbook".to_string(),
                summary: None,
                page_count: 40,
            },
        ]
    }

    fn planner() -> TaskPlanner {
        let config = PixieConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        TaskPlanner::new(&config, "plan".to_string())
    }

    #[test]
    fn test_parse_tasks_wrapper_object() {
        let content = r#"{"tasks": [
            {"name": "Find revenue", "description": "Q3 revenue figures", "document_id": "d1"},
            {"name": "Find policy", "description": "remote work policy", "document_id": "d2"}
        ]}"#;
        let (tasks, invalid) =
            TaskPlanner::parse_tasks(content, &catalog()).unwrap_or_else(|| unreachable!());
        assert_eq!(tasks.len(), 2);
        assert_eq!(invalid, 0);
        assert_eq!(tasks[0].document_id, "d1");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_parse_tasks_bare_array() {
        let content = r#"[{"name": "t", "description": "d", "document_id": "d2"}]"#;
        let (tasks, invalid) =
            TaskPlanner::parse_tasks(content, &catalog()).unwrap_or_else(|| unreachable!());
        assert_eq!(tasks.len(), 1);
        assert_eq!(invalid, 0);
    }

    #[test]
    fn test_parse_tasks_drops_unknown_document() {
        let content = r#"{"tasks": [
            {"name": "ok", "description": "d", "document_id": "d1"},
            {"name": "bad", "description": "d", "document_id": "d99"}
        ]}"#;
        let (tasks, invalid) =
            TaskPlanner::parse_tasks(content, &catalog()).unwrap_or_else(|| unreachable!());
        assert_eq!(tasks.len(), 1);
        assert_eq!(invalid, 1);
    }

    #[test]
    fn test_parse_tasks_rejects_multi_document_assignment() {
        let content = r#"{"tasks": [
            {"name": "multi", "description": "d", "document_id": ["d1", "d2"]}
        ]}"#;
        let (tasks, invalid) =
            TaskPlanner::parse_tasks(content, &catalog()).unwrap_or_else(|| unreachable!());
        assert!(tasks.is_empty());
        assert_eq!(invalid, 1);
    }

    #[test]
    fn test_parse_tasks_accepts_document_alias() {
        let content = r#"{"tasks": [{"name": "t", "description": "d", "document": "d1"}]}"#;
        let (tasks, _) =
            TaskPlanner::parse_tasks(content, &catalog()).unwrap_or_else(|| unreachable!());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].document_id, "d1");
    }

    #[test]
    fn test_parse_tasks_garbled_is_none() {
        assert!(TaskPlanner::parse_tasks("no json", &catalog()).is_none());
    }

    #[test]
    fn test_fallback_tasks_one_per_document() {
        let tasks = TaskPlanner::fallback_tasks(&catalog());
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].document_id, "d1");
        assert_eq!(tasks[1].document_id, "d2");
    }

    #[test]
    fn test_apply_edits_sufficient_clears_pending() {
        let p = planner();
        let mut plan = TaskPlan::new(
            "q",
            vec![
                AgentTask::new("a", "a", "d1"),
                AgentTask::new("b", "b", "d1"),
                AgentTask::new("c", "c", "d2"),
            ],
        );
        plan.tasks[0].start();
        plan.tasks[0].complete();

        let edits = TaskPlanner::parse_edits(r#"{"action": "sufficient"}"#)
            .unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());
        assert_eq!(plan.tasks.len(), 1);
        assert!(!plan.has_pending());
    }

    #[test]
    fn test_apply_edits_keep_is_noop() {
        let p = planner();
        let mut plan = TaskPlan::new("q", vec![AgentTask::new("a", "a", "d1")]);
        let edits =
            TaskPlanner::parse_edits(r#"{"action": "keep"}"#).unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn test_apply_edits_remove_then_add() {
        let p = planner();
        let mut plan = TaskPlan::new(
            "q",
            vec![AgentTask::new("a", "a", "d1"), AgentTask::new("b", "b", "d1")],
        );
        let remove_id = plan.tasks[1].id.clone();
        let content = format!(
            r#"[{{"action": "remove", "task_id": "{remove_id}"}},
                {{"action": "add", "task": {{"name": "new", "description": "n", "document_id": "d2"}}}}]"#
        );
        let edits = TaskPlanner::parse_edits(&content).unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());
        assert_eq!(plan.tasks.len(), 2);
        assert!(plan.tasks.iter().any(|t| t.name == "new"));
        assert!(!plan.tasks.iter().any(|t| t.id == remove_id));
    }

    #[test]
    fn test_apply_edits_single_addition_only() {
        let p = planner();
        let mut plan = TaskPlan::new("q", vec![AgentTask::new("a", "a", "d1")]);
        let content = r#"[
            {"action": "add", "task": {"name": "one", "description": "1", "document_id": "d1"}},
            {"action": "add", "task": {"name": "two", "description": "2", "document_id": "d2"}}
        ]"#;
        let edits = TaskPlanner::parse_edits(content).unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());
        assert_eq!(plan.tasks.len(), 2);
        assert!(plan.tasks.iter().any(|t| t.name == "one"));
        assert!(!plan.tasks.iter().any(|t| t.name == "two"));
    }

    #[test]
    fn test_apply_edits_addition_respects_cap() {
        let config = PixieConfig::builder()
            .api_key("test")
            .max_tasks_per_plan(2)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let p = TaskPlanner::new(&config, "plan".to_string());
        let mut plan = TaskPlan::new(
            "q",
            vec![AgentTask::new("a", "a", "d1"), AgentTask::new("b", "b", "d2")],
        );
        let edits = TaskPlanner::parse_edits(
            r#"{"action": "add", "task": {"name": "c", "description": "c", "document_id": "d1"}}"#,
        )
        .unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());
        assert_eq!(plan.tasks.len(), 2);
    }

    #[test]
    fn test_apply_edits_modify_pending_only() {
        let p = planner();
        let mut plan = TaskPlan::new(
            "q",
            vec![AgentTask::new("a", "a", "d1"), AgentTask::new("b", "b", "d1")],
        );
        plan.tasks[0].start();
        plan.tasks[0].complete();
        let completed_id = plan.tasks[0].id.clone();
        let pending_id = plan.tasks[1].id.clone();

        let content = format!(
            r#"[{{"action": "modify", "task_id": "{completed_id}", "description": "hacked"}},
                {{"action": "modify", "task_id": "{pending_id}", "description": "refocused"}}]"#
        );
        let edits = TaskPlanner::parse_edits(&content).unwrap_or_else(|_| unreachable!());
        p.apply_edits(&mut plan, edits, &catalog());

        assert_eq!(plan.tasks[0].description, "a");
        assert_eq!(plan.tasks[1].description, "refocused");
    }

    #[test]
    fn test_truncate_chars_multibyte_safe() {
        let text = "ééééé";
        assert_eq!(truncate_chars(text, 3), "ééé");
    }
}
