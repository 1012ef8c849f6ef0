//! The iterative task loop: decompose, plan, confirm, execute, re-analyse.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loom_core::tools::{dispatch_tool_call, ToolCall, ToolContext, ToolRegistry};
use loom_core::{AgentError, Message, Todo, TodoList, TodoStatus, ToolResult};
use loom_llm::{extract_json_object, ChatRequest, SharedChatClient};

use crate::confirmation::{ConfirmationBridge, ConfirmationOutcome, ConfirmationResponse};
use crate::context::TaskContext;
use crate::planner::{plan_actions, ProposedAction};

#[derive(Debug, Clone)]
pub struct TaskExecutorConfig {
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub workdir: PathBuf,
    pub temperature: Option<f32>,
}

impl Default for TaskExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            workdir: PathBuf::from("."),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum IterationResult {
    /// Actions are parked in the confirmation bridge under `confirmation_id`.
    NeedsConfirmation {
        confirmation_id: String,
        todo: Todo,
        actions: Vec<ProposedAction>,
    },
    TaskComplete,
    MaxIterations,
    Error {
        message: String,
    },
}

#[derive(Debug, Default)]
struct ProgressAnalysis {
    insights: Vec<String>,
    new_todos: Vec<(String, String)>,
    remove_todos: Vec<String>,
    is_complete: bool,
    reasoning: String,
}

const DECOMPOSE_PROMPT: &str = "You decompose a user request into an ordered todo list. \
Respond with JSON only: {\"is_simple_query\": bool, \"todos\": [{\"description\": string, \"active_form\": string}]}. \
A simple query is a single-step, read-only request. Keep the list short.";

const ANALYSE_PROMPT: &str = "You assess progress on a task from its execution history. \
Respond with JSON only: {\"insights\": [string], \"new_todos\": [{\"description\": string, \"active_form\": string}], \
\"remove_todos\": [string], \"is_complete\": bool, \"reasoning\": string}. \
Failed actions are acceptable when their goal is already met.";

const CONFIRM_PROMPT: &str = "Given the original request and what was done, decide whether the \
request is satisfied. Respond with JSON only: {\"satisfied\": bool}.";

const INTERPRET_PROMPT: &str = "Write the final answer for the user from the execution history. \
Be direct; quote relevant tool output. Plain text, no JSON.";

pub struct TaskExecutor {
    llm: SharedChatClient,
    tools: Arc<ToolRegistry>,
    bridge: ConfirmationBridge,
    config: TaskExecutorConfig,
}

impl TaskExecutor {
    pub fn new(llm: SharedChatClient, tools: Arc<ToolRegistry>, config: TaskExecutorConfig) -> Self {
        Self {
            llm,
            tools,
            bridge: ConfirmationBridge::new(),
            config,
        }
    }

    pub fn bridge(&self) -> &ConfirmationBridge {
        &self.bridge
    }

    /// Decompose the request into todos and classify it. A transport failure
    /// degrades to a single todo carrying the request verbatim.
    pub async fn create_initial_task(&self, request: &str) -> TaskContext {
        let chat_request = ChatRequest::new(vec![
            Message::system(DECOMPOSE_PROMPT),
            Message::user(request.to_string()),
        ])
        .with_temperature(self.config.temperature.unwrap_or(0.0));

        let parsed = match self.llm.chat(chat_request).await {
            Ok(response) => extract_json_object(&response.content),
            Err(error) => {
                log::warn!("task decomposition unavailable ({error}), using single todo");
                None
            }
        };

        let mut todos = Vec::new();
        let mut is_simple_query = false;

        if let Some(value) = parsed {
            is_simple_query = value
                .get("is_simple_query")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if let Some(list) = value.get("todos").and_then(|v| v.as_array()) {
                for entry in list {
                    let Some(description) = entry.get("description").and_then(|v| v.as_str())
                    else {
                        continue;
                    };
                    let active_form = entry
                        .get("active_form")
                        .and_then(|v| v.as_str())
                        .unwrap_or(description);
                    todos.push(Todo::new(description, active_form));
                }
            }
        }

        if todos.is_empty() {
            todos.push(Todo::new(request, "Working on the request"));
        }

        let mut ctx = TaskContext::new(request, TodoList::new(todos), self.config.max_iterations);
        ctx.is_simple_query = is_simple_query;
        ctx
    }

    /// One planning round. Either parks actions for confirmation or reports a
    /// terminal state.
    pub async fn execute_next_iteration(&self, ctx: &mut TaskContext) -> IterationResult {
        if ctx.cancel.is_cancelled() {
            return IterationResult::Error {
                message: "cancelled".to_string(),
            };
        }

        if ctx.iteration >= ctx.max_iterations {
            ctx.reset_in_progress();
            return IterationResult::MaxIterations;
        }
        ctx.iteration += 1;

        if !ctx.history.is_empty() {
            let analysis = self.analyse_progress(ctx).await;
            for insight in &analysis.insights {
                log::debug!("analyser insight: {insight}");
            }
            if !analysis.reasoning.is_empty() {
                log::debug!("analyser reasoning: {}", analysis.reasoning);
            }

            ctx.todos.remove_by_description(&analysis.remove_todos);
            for (description, active_form) in analysis.new_todos {
                ctx.todos.push(Todo::new(description, active_form));
            }

            if analysis.is_complete {
                // The analyser judged the remaining goals met or moot; close
                // out open todos so the completion predicate can hold.
                for todo in &mut ctx.todos.items {
                    if matches!(todo.status, TodoStatus::Pending | TodoStatus::InProgress) {
                        if todo.last_result.is_none() && !analysis.reasoning.is_empty() {
                            todo.last_result = Some(analysis.reasoning.clone());
                        }
                        todo.set_status(TodoStatus::Completed);
                    }
                }
                return IterationResult::TaskComplete;
            }
        }

        let Some(todo) = ctx.todos.first_pending_mut() else {
            return IterationResult::TaskComplete;
        };
        todo.set_status(TodoStatus::InProgress);
        let todo = todo.clone();

        let actions = plan_actions(&self.llm, &self.tools, &ctx.request, &todo).await;

        let confirmation_id = self.bridge.register(todo.clone(), actions.clone());
        IterationResult::NeedsConfirmation {
            confirmation_id,
            todo,
            actions,
        }
    }

    /// Dispatch approved actions, append the history record, and complete the
    /// todo if any action succeeded.
    pub async fn execute_and_update_context(
        &self,
        actions: Vec<ProposedAction>,
        todo_id: &str,
        ctx: &mut TaskContext,
    ) -> Vec<ToolResult> {
        let tool_ctx = ToolContext::new(self.config.workdir.clone())
            .with_timeout(self.config.tool_timeout)
            .with_cancel(ctx.cancel.clone());

        let mut results = Vec::with_capacity(actions.len());
        for action in &actions {
            if ctx.cancel.is_cancelled() {
                results.push(ToolResult::fail("Cancelled"));
                continue;
            }

            let result = match &action.tool {
                Some(tool) => {
                    let call = ToolCall::new(action.id.clone(), tool.clone(), action.arguments.clone());
                    match dispatch_tool_call(&self.tools, &call, &tool_ctx).await {
                        Ok(result) => result,
                        Err(error) => ToolResult::fail(error.to_string()),
                    }
                }
                None => ToolResult::fail("Skipped: action does not map to a tool"),
            };
            results.push(result);
        }

        let any_success = results.iter().any(|r| r.success);
        let todo_snapshot = if let Some(todo) = ctx.todos.items.iter_mut().find(|t| t.id == todo_id)
        {
            if any_success {
                let note: String = results
                    .iter()
                    .find(|r| r.success)
                    .map(|r| r.content_for_llm().chars().take(120).collect())
                    .unwrap_or_default();
                todo.last_result = Some(note);
                todo.set_status(TodoStatus::Completed);
            } else {
                // Failed attempt: back to pending so the analyser decides
                // whether to retry, rewrite or close the task.
                if todo.status == TodoStatus::InProgress {
                    todo.last_result = results
                        .iter()
                        .find(|r| !r.success)
                        .and_then(|r| r.error.clone());
                    todo.set_status(TodoStatus::Pending);
                }
            }
            todo.clone()
        } else {
            Todo::new("(unknown todo)", "(unknown)")
        };

        ctx.record(todo_snapshot, actions, results.clone());
        results
    }

    /// Strict completion predicate: every todo completed and the LLM confirms
    /// the original request is satisfied. A transport failure falls back to
    /// the todo state alone.
    pub async fn is_task_complete(&self, ctx: &TaskContext) -> bool {
        if !ctx.todos.all_completed() {
            return false;
        }

        let chat_request = ChatRequest::new(vec![
            Message::system(CONFIRM_PROMPT),
            Message::user(format!(
                "Request: {}\n\nHistory:\n{}",
                ctx.request,
                ctx.format_history()
            )),
        ])
        .with_temperature(0.0);

        match self.llm.chat(chat_request).await {
            Ok(response) => extract_json_object(&response.content)
                .and_then(|v| v.get("satisfied").and_then(|s| s.as_bool()))
                .unwrap_or(true),
            Err(error) => {
                log::warn!("completion check unavailable ({error}), trusting todo state");
                true
            }
        }
    }

    /// Natural-language answer for the user, used for simple queries and at
    /// task completion.
    pub async fn interpret_results(&self, ctx: &TaskContext) -> String {
        let chat_request = ChatRequest::new(vec![
            Message::system(INTERPRET_PROMPT),
            Message::user(format!(
                "Request: {}\n\nHistory:\n{}",
                ctx.request,
                ctx.format_history()
            )),
        ]);

        match self.llm.chat(chat_request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            _ => ctx
                .history
                .last()
                .and_then(|record| record.results.last())
                .map(|result| result.content_for_llm())
                .unwrap_or_else(|| "Task finished.".to_string()),
        }
    }

    async fn analyse_progress(&self, ctx: &TaskContext) -> ProgressAnalysis {
        let chat_request = ChatRequest::new(vec![
            Message::system(ANALYSE_PROMPT),
            Message::user(format!(
                "Request: {}\n\n{}\n\nHistory:\n{}",
                ctx.request,
                ctx.todos.format_for_prompt(),
                ctx.format_history()
            )),
        ])
        .with_temperature(0.0);

        let parsed = match self.llm.chat(chat_request).await {
            Ok(response) => extract_json_object(&response.content),
            Err(error) => {
                log::warn!("progress analysis unavailable ({error}), continuing with pending todos");
                None
            }
        };

        let Some(value) = parsed else {
            // Default analysis: keep going with whatever is pending.
            return ProgressAnalysis::default();
        };

        ProgressAnalysis {
            insights: string_array(&value, "insights"),
            new_todos: value
                .get("new_todos")
                .and_then(|v| v.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|entry| {
                            let description = entry.get("description")?.as_str()?.to_string();
                            let active_form = entry
                                .get("active_form")
                                .and_then(|v| v.as_str())
                                .unwrap_or(&description)
                                .to_string();
                            Some((description, active_form))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            remove_todos: string_array(&value, "remove_todos"),
            is_complete: value
                .get("is_complete")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            reasoning: value
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Drive a task to a terminal state, routing every confirmation through
    /// `decide` (which sees the pending-confirmation id, the todo and the
    /// proposed actions). Returns the user-facing answer.
    pub async fn run<F>(&self, ctx: &mut TaskContext, mut decide: F) -> Result<String, AgentError>
    where
        F: FnMut(&str, &Todo, &[ProposedAction]) -> ConfirmationResponse,
    {
        loop {
            match self.execute_next_iteration(ctx).await {
                IterationResult::NeedsConfirmation {
                    confirmation_id,
                    todo,
                    actions,
                } => {
                    let response = decide(&confirmation_id, &todo, &actions);
                    match self.bridge.resolve(&confirmation_id, response) {
                        Some(ConfirmationOutcome::Execute { todo, actions }) => {
                            self.execute_and_update_context(actions, &todo.id, ctx).await;
                            if ctx.is_simple_query {
                                // Single-step read-only requests answer
                                // straight from the first execution, with no
                                // further analysis round.
                                return Ok(self.interpret_results(ctx).await);
                            }
                        }
                        Some(ConfirmationOutcome::Restart { new_request }) => {
                            *ctx = self.create_initial_task(&new_request).await;
                        }
                        Some(ConfirmationOutcome::Dropped) | None => {
                            return Err(AgentError::Cancelled);
                        }
                    }
                }
                IterationResult::TaskComplete => {
                    if self.is_task_complete(ctx).await {
                        return Ok(self.interpret_results(ctx).await);
                    }
                    // Not confirmed: loop back so the next analysis pass can
                    // add todos or retry, bounded by the iteration budget.
                    log::debug!("completion not confirmed, continuing");
                }
                IterationResult::MaxIterations => {
                    return Ok("max iterations reached".to_string());
                }
                IterationResult::Error { message } => {
                    if message == "cancelled" {
                        return Err(AgentError::Cancelled);
                    }
                    return Err(AgentError::Validation(message));
                }
            }
        }
    }
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
