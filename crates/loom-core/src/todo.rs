//! Todo list types for iterative task tracking.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Default for TodoStatus {
    fn default() -> Self {
        TodoStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub description: String,
    /// Imperative phrasing shown while the todo is in progress.
    pub active_form: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<String>,
}

impl Todo {
    pub fn new(description: impl Into<String>, active_form: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            active_form: active_form.into(),
            status: TodoStatus::Pending,
            last_result: None,
        }
    }

    /// Apply a status transition. A completed todo never returns to pending;
    /// such transitions are ignored.
    pub fn set_status(&mut self, status: TodoStatus) -> bool {
        if self.status == TodoStatus::Completed && status == TodoStatus::Pending {
            log::warn!("ignoring completed -> pending transition for todo '{}'", self.description);
            return false;
        }
        self.status = status;
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    pub items: Vec<Todo>,
}

impl TodoList {
    pub fn new(items: Vec<Todo>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, todo: Todo) {
        self.items.push(todo);
    }

    pub fn first_pending_mut(&mut self) -> Option<&mut Todo> {
        self.items
            .iter_mut()
            .find(|item| item.status == TodoStatus::Pending)
    }

    pub fn all_completed(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|item| item.status == TodoStatus::Completed)
    }

    pub fn has_in_progress(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.status == TodoStatus::InProgress)
    }

    /// Remove todos whose descriptions appear in `descriptions`.
    /// Already-completed todos are kept as history.
    pub fn remove_by_description(&mut self, descriptions: &[String]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| {
            item.status == TodoStatus::Completed || !descriptions.contains(&item.description)
        });
        before - self.items.len()
    }

    /// Format the list for inclusion in an LLM prompt.
    pub fn format_for_prompt(&self) -> String {
        let mut output = String::from("## Current Task List\n");

        for item in &self.items {
            let status_icon = match item.status {
                TodoStatus::Pending => "[ ]",
                TodoStatus::InProgress => "[/]",
                TodoStatus::Completed => "[x]",
                TodoStatus::Failed => "[!]",
            };

            output.push_str(&format!("\n{} {}", status_icon, item.description));

            if let Some(note) = &item.last_result {
                output.push_str(&format!("\n    Result: {}", note.replace('\n', "\n    ")));
            }
        }

        let completed = self
            .items
            .iter()
            .filter(|i| i.status == TodoStatus::Completed)
            .count();
        output.push_str(&format!(
            "\n\nProgress: {}/{} tasks completed",
            completed,
            self.items.len()
        ));

        output
    }
}
