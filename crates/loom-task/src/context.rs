use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use loom_core::{Todo, TodoList, TodoStatus, ToolResult};

use crate::planner::ProposedAction;

/// One executed iteration step: the todo that was worked on, the actions
/// dispatched for it and their results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub todo: Todo,
    pub actions: Vec<ProposedAction>,
    pub results: Vec<ToolResult>,
    pub recorded_at: DateTime<Utc>,
}

/// State of one user task across iterations. Owned by its executor; destroyed
/// on a terminal state.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub request: String,
    pub todos: TodoList,
    pub history: Vec<ExecutionRecord>,
    pub iteration: usize,
    pub max_iterations: usize,
    pub is_simple_query: bool,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(request: impl Into<String>, todos: TodoList, max_iterations: usize) -> Self {
        Self {
            request: request.into(),
            todos,
            history: Vec::new(),
            iteration: 0,
            max_iterations,
            is_simple_query: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn record(&mut self, todo: Todo, actions: Vec<ProposedAction>, results: Vec<ToolResult>) {
        self.history.push(ExecutionRecord {
            todo,
            actions,
            results,
            recorded_at: Utc::now(),
        });
    }

    /// Release any in-flight marking, e.g. when the iteration budget runs out.
    pub fn reset_in_progress(&mut self) {
        for todo in &mut self.todos.items {
            if todo.status == TodoStatus::InProgress {
                todo.set_status(TodoStatus::Pending);
            }
        }
    }

    /// Compact history rendering for analyser and interpreter prompts.
    pub fn format_history(&self) -> String {
        let mut output = String::new();
        for record in &self.history {
            output.push_str(&format!("Todo: {}\n", record.todo.description));
            for (action, result) in record.actions.iter().zip(&record.results) {
                let status = if result.success { "ok" } else { "failed" };
                output.push_str(&format!(
                    "  - {} [{}] {}\n",
                    action.description,
                    status,
                    result.content_for_llm().chars().take(200).collect::<String>()
                ));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::Todo;

    #[test]
    fn reset_in_progress_returns_to_pending_only() {
        let mut ctx = TaskContext::new(
            "req",
            TodoList::new(vec![Todo::new("a", "doing a"), Todo::new("b", "doing b")]),
            10,
        );
        ctx.todos.items[0].set_status(TodoStatus::InProgress);
        ctx.todos.items[1].set_status(TodoStatus::Completed);

        ctx.reset_in_progress();

        assert_eq!(ctx.todos.items[0].status, TodoStatus::Pending);
        assert_eq!(ctx.todos.items[1].status, TodoStatus::Completed);
    }

    #[test]
    fn format_history_marks_failures() {
        let mut ctx = TaskContext::new("req", TodoList::default(), 10);
        ctx.record(
            Todo::new("delete old.txt", "deleting"),
            vec![ProposedAction::mapped(
                "delete the file",
                "file_delete",
                serde_json::json!({"path": "old.txt"}),
            )],
            vec![ToolResult::fail("not found")],
        );

        let rendered = ctx.format_history();
        assert!(rendered.contains("delete old.txt"));
        assert!(rendered.contains("[failed]"));
        assert!(rendered.contains("not found"));
    }
}
