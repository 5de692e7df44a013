//! System prompts and template builders for the pipeline stages.
//!
//! Prompts are the core instructions that define each stage's behavior and
//! the JSON contracts the parsers rely on. Template builders format user
//! messages with query context, catalog listings, and task state.

use std::fmt::Write;
use std::path::Path;

use crate::storage::DocumentInfo;

use super::task::{AgentTask, TaskPlan, TaskResult};

/// System prompt for conversation summarization.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates concise, \
factual conversation summaries. Capture the main topics, key questions, important conclusions, \
and unresolved threads. Never invent details that were not discussed.";

/// System prompt for query reformulation.
pub const REFORMULATOR_SYSTEM_PROMPT: &str = r#"You are a query reformulation expert. You resolve references in a user's latest question so it can stand alone for document search.

## Instructions

1. Resolve pronouns and references ("it", "this", "that one") to their subjects from the conversation context.
2. Keep the query SHORT and focused only on the current question's intent.
3. Do not merge previous questions or combine multiple intents.
4. Expand unclear abbreviations when the context makes them unambiguous.
5. If the query is already self-contained, return it unchanged.

## Output Format (JSON)

```json
{"reformulated": "the self-contained query", "changed": true}
```

Set "changed" to false when you returned the query unchanged.
Return ONLY the JSON object, no surrounding text."#;

/// System prompt for query classification.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a query classification expert. You decide whether a question needs document analysis to answer, or can be answered directly.

## Instructions

1. Questions about specific content, figures, policies, or findings need documents.
2. Greetings, small talk, and questions about your own capabilities do not.
3. When documents are not needed, write the direct answer yourself.

## Output Format (JSON)

```json
{"needs_documents": true, "reasoning": "short explanation", "direct_answer": "only when needs_documents is false"}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the adaptive task planner (initial plan and updates).
pub const PLANNER_SYSTEM_PROMPT: &str = "You are an adaptive task planning agent for document \
analysis. You decompose a query into the minimum number of focused tasks, each bound to exactly \
one document, and revise the plan as findings arrive. You are pragmatic: you stop as soon as \
the gathered information answers the user's query. Always respond with valid JSON.";

/// System prompt for vision page selection.
pub const SELECTOR_SYSTEM_PROMPT: &str = "You are a document page selection expert. You look at \
actual page images and pick the pages most likely to contain the information a task needs. \
Consider visible text, tables, charts, headings, and overall page structure. Always respond \
with valid JSON.";

/// System prompt for per-task page analysis.
pub const ANALYST_SYSTEM_PROMPT: &str = "You are DocPixie, an AI assistant that helps users \
understand and analyze their documents. You will be shown actual document pages as images. \
Analyze them carefully and answer based only on what you see. Always cite which pages you are \
referencing.";

/// System prompt for final response synthesis.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are DocPixie, an expert at synthesizing document \
analysis results. You combine findings from multiple focused tasks into one coherent answer \
that addresses the user's question, using only information present in the findings.";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/docpixie/prompts";

/// Filename for the summarization prompt template.
const SUMMARY_FILENAME: &str = "summary.md";
/// Filename for the reformulation prompt template.
const REFORMULATOR_FILENAME: &str = "reformulate.md";
/// Filename for the classification prompt template.
const CLASSIFIER_FILENAME: &str = "classify.md";
/// Filename for the planner prompt template.
const PLANNER_FILENAME: &str = "plan.md";
/// Filename for the selection prompt template.
const SELECTOR_FILENAME: &str = "select.md";
/// Filename for the analysis prompt template.
const ANALYST_FILENAME: &str = "analyze.md";
/// Filename for the synthesis prompt template.
const SYNTHESIS_FILENAME: &str = "synthesize.md";

/// A set of system prompts for all pipeline stages.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from configuration, environment, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Conversation summarization.
    pub summary: String,
    /// Query reformulation.
    pub reformulator: String,
    /// Query classification.
    pub classifier: String,
    /// Task planning and plan updates.
    pub planner: String,
    /// Vision page selection.
    pub selector: String,
    /// Per-task page analysis.
    pub analyst: String,
    /// Final response synthesis.
    pub synthesis: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in
    /// defaults.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `prompt_dir` argument (from configuration)
    /// 2. `DOCPIXIE_PROMPT_DIR` environment variable
    /// 3. `~/.config/docpixie/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(std::path::PathBuf::from)
            .or_else(|| {
                std::env::var("DOCPIXIE_PROMPT_DIR")
                    .ok()
                    .map(std::path::PathBuf::from)
            })
            .or_else(|| dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR)));

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            summary: load_file(SUMMARY_FILENAME, SUMMARY_SYSTEM_PROMPT),
            reformulator: load_file(REFORMULATOR_FILENAME, REFORMULATOR_SYSTEM_PROMPT),
            classifier: load_file(CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
            planner: load_file(PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            selector: load_file(SELECTOR_FILENAME, SELECTOR_SYSTEM_PROMPT),
            analyst: load_file(ANALYST_FILENAME, ANALYST_SYSTEM_PROMPT),
            synthesis: load_file(SYNTHESIS_FILENAME, SYNTHESIS_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            summary: SUMMARY_SYSTEM_PROMPT.to_string(),
            reformulator: REFORMULATOR_SYSTEM_PROMPT.to_string(),
            classifier: CLASSIFIER_SYSTEM_PROMPT.to_string(),
            planner: PLANNER_SYSTEM_PROMPT.to_string(),
            selector: SELECTOR_SYSTEM_PROMPT.to_string(),
            analyst: ANALYST_SYSTEM_PROMPT.to_string(),
            synthesis: SYNTHESIS_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten; use this for initial scaffolding only.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (SUMMARY_FILENAME, SUMMARY_SYSTEM_PROMPT),
            (REFORMULATOR_FILENAME, REFORMULATOR_SYSTEM_PROMPT),
            (CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
            (PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            (SELECTOR_FILENAME, SELECTOR_SYSTEM_PROMPT),
            (ANALYST_FILENAME, ANALYST_SYSTEM_PROMPT),
            (SYNTHESIS_FILENAME, SYNTHESIS_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }
}

/// Formats a document catalog for planner prompts.
#[must_use]
pub fn format_catalog(catalog: &[DocumentInfo]) -> String {
    if catalog.is_empty() {
        return "No documents available".to_string();
    }
    let entries: Vec<String> = catalog
        .iter()
        .map(|doc| {
            let summary = doc
                .summary
                .clone()
                .unwrap_or_else(|| format!("Document with {} pages", doc.page_count));
            format!("{}: {}\nSummary: {summary}", doc.id, doc.name)
        })
        .collect();
    entries.join("\n\n")
}

/// Builds the user message for conversation summarization.
#[must_use]
pub fn build_summary_prompt(conversation_text: &str) -> String {
    format!(
        "Summarize the following conversation, focusing on:\n\
         1. The main topics discussed\n\
         2. Key questions asked by the user\n\
         3. Important information or conclusions\n\
         4. Any unresolved questions\n\n\
         Keep the summary concise but complete.\n\n\
         Conversation:\n{conversation_text}\n\nSummary:"
    )
}

/// Builds the user message for query reformulation.
#[must_use]
pub fn build_reformulation_prompt(conversation_context: &str, current_query: &str) -> String {
    format!(
        "CONVERSATION CONTEXT:\n{conversation_context}\n\n\
         CURRENT QUERY: {current_query}\n\n\
         Return a JSON object with the reformulated query. \
         Output only valid JSON with no surrounding text."
    )
}

/// Builds the user message for query classification.
#[must_use]
pub fn build_classification_prompt(query: &str) -> String {
    format!(
        "Decide whether this query needs document analysis to answer.\n\n\
         QUERY: {query}\n\n\
         Return only the JSON object."
    )
}

/// Builds the user message for initial task planning.
#[must_use]
pub fn build_planning_prompt(query: &str, catalog: &[DocumentInfo], max_tasks: usize) -> String {
    format!(
        "Create an initial task plan for a document analysis query. Create the MINIMUM \
         number of tasks (1-{max_tasks}) needed to gather distinct information.\n\n\
         TASK CREATION RULES:\n\
         1. Create the fewest tasks possible; only split when tasks need fundamentally \
         different information.\n\
         2. Each task retrieves distinct information that cannot be found together.\n\
         3. Keep task names short and clear.\n\
         4. Descriptions state the specific information to find.\n\
         5. Each task is assigned EXACTLY ONE document id from the catalog below.\n\n\
         OUTPUT FORMAT (JSON):\n\
         {{\"tasks\": [{{\"name\": \"...\", \"description\": \"...\", \"document_id\": \"...\"}}]}}\n\n\
         ----------------\n\
         User's query: {query}\n\n\
         AVAILABLE DOCUMENTS:\n{catalog}\n\
         ----------------\n\n\
         Output only valid JSON, no surrounding text.",
        catalog = format_catalog(catalog),
    )
}

/// Builds the user message for an adaptive plan update.
#[must_use]
pub fn build_plan_update_prompt(
    original_query: &str,
    catalog: &[DocumentInfo],
    plan: &TaskPlan,
    completed_task: &AgentTask,
    findings: &str,
) -> String {
    format!(
        "You just completed a task. Decide whether the remaining plan still fits what \
         you have learned.\n\n\
         DECISION OPTIONS (respond with one JSON object, or an array of edit objects):\n\
         - {{\"action\": \"keep\"}} when the remaining tasks are still right\n\
         - {{\"action\": \"sufficient\"}} when gathered information already answers the \
         query (remaining pending tasks will be dropped)\n\
         - {{\"action\": \"remove\", \"task_id\": \"...\"}} to drop a now-redundant pending task\n\
         - {{\"action\": \"modify\", \"task_id\": \"...\", \"description\": \"...\"}} to \
         refocus a pending task\n\
         - {{\"action\": \"add\", \"task\": {{\"name\": \"...\", \"description\": \"...\", \
         \"document_id\": \"...\"}}}} to add at most one new task\n\n\
         Only pending tasks can be removed or modified.\n\n\
         ----------------\n\
         ORIGINAL QUERY: {original_query}\n\n\
         AVAILABLE DOCUMENTS:\n{catalog}\n\n\
         CURRENT TASK PLAN:\n{plan_status}\n\n\
         LATEST TASK COMPLETED:\n\
         Task: {completed_name}\n\
         Findings: {findings}\n\n\
         PROGRESS SO FAR:\n{progress}\n\
         ----------------\n\n\
         Output only valid JSON, no surrounding text.",
        catalog = format_catalog(catalog),
        plan_status = format_plan_status(plan),
        completed_name = completed_task.name,
        progress = format_progress(plan),
    )
}

/// Builds the user message preamble for vision page selection.
///
/// The page images themselves are appended as separate content parts,
/// each preceded by a `[Page k]` marker.
#[must_use]
pub fn build_selection_prompt(task_name: &str, task_description: &str, max_pages: usize) -> String {
    format!(
        "Analyze these document page images and select the at most {max_pages} pages most \
         relevant to this task:\n\n\
         TASK: {task_name}\n\
         TASK DESCRIPTION: {task_description}\n\n\
         Look at each page image carefully. Consider visible text, charts, tables, \
         headings, and page structure. Page numbers are given by the [Page k] markers.\n\n\
         Return a JSON object with the relevant page numbers:\n\
         {{\"selected_pages\": [1, 3, 7], \"reasoning\": \"why these pages\"}}\n\n\
         Output only valid JSON. Here are the page images:"
    )
}

/// Builds the user message preamble for per-task page analysis.
#[must_use]
pub fn build_analysis_prompt(query: &str, task_description: &str) -> String {
    format!(
        "You are completing one focused task as part of a larger document analysis.\n\n\
         USER QUERY: {query}\n\n\
         CURRENT TASK: {task_description}\n\n\
         ANALYSIS GUIDELINES:\n\
         1. Focus only on information relevant to this task.\n\
         2. Extract concrete data, figures, dates, and names from the pages.\n\
         3. If the pages do not contain relevant information, say so clearly.\n\
         4. Cite the page markers you reference.\n\n\
         Your findings will be combined with other task results later; stay focused \
         on just this task. Analyze the page images below."
    )
}

/// Builds the user message for final response synthesis.
#[must_use]
pub fn build_synthesis_prompt(
    original_query: &str,
    reformulated_query: &str,
    results: &[TaskResult],
) -> String {
    let mut results_text = String::new();
    for (i, result) in results.iter().enumerate() {
        let _ = write!(
            results_text,
            "TASK {n}: {name}\nDescription: {description}\nAnalysis: {analysis}\n\n---\n",
            n = i + 1,
            name = result.task.name,
            description = result.task.description,
            analysis = result.analysis,
        );
    }

    format!(
        "Answer the user's question using only the analysis results below.\n\n\
         ORIGINAL QUERY: {original_query}\n\
         INTERPRETED AS: {reformulated_query}\n\n\
         ANALYSIS RESULTS:\n{results_text}\n\
         INSTRUCTIONS:\n\
         - Answer only what the user asked, conversationally and directly.\n\
         - Use only information from the analysis results.\n\
         - If the results do not contain enough information, say so clearly.\n\
         - Do not mention tasks, pipelines, or internal processing.\n\n\
         Answer the user's question now."
    )
}

/// Formats the plan state for update prompts, including task ids so the
/// model can reference them in edits.
fn format_plan_status(plan: &TaskPlan) -> String {
    let lines: Vec<String> = plan
        .tasks
        .iter()
        .map(|t| format!("- [{}] {} ({})", t.id, t.name, t.status))
        .collect();
    lines.join("\n")
}

/// Formats completed-task progress for update prompts.
fn format_progress(plan: &TaskPlan) -> String {
    let completed = plan.completed_tasks();
    if completed.is_empty() {
        return "No tasks completed yet.".to_string();
    }
    let lines: Vec<String> = completed
        .iter()
        .map(|t| format!("- done: {}", t.name))
        .collect();
    lines.join("\n")
}
