use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolCall;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Retention priority used by the priority-based pruning strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub priority: MessagePriority,
    /// Estimated token cost, assigned by the context store on insert.
    #[serde(default)]
    pub tokens: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    fn build(role: Role, content: String) -> Self {
        Self {
            id: generate_id(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            priority: MessagePriority::Normal,
            tokens: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            tool_calls,
            ..Self::build(Role::Assistant, content.into())
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            priority: MessagePriority::Critical,
            ..Self::build(Role::System, content.into())
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::build(Role::Tool, content.into())
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FunctionCall, ToolCall};

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::assistant("ok", None).role, Role::Assistant);
        assert_eq!(Message::system("sys").role, Role::System);
        assert_eq!(Message::tool_result("call_1", "out").role, Role::Tool);
    }

    #[test]
    fn system_messages_default_to_critical_priority() {
        assert_eq!(Message::system("sys").priority, MessagePriority::Critical);
        assert_eq!(Message::user("hi").priority, MessagePriority::Normal);
    }

    #[test]
    fn tool_result_links_call_id() {
        let message = Message::tool_result("call_42", "done");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_42"));
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(MessagePriority::Low < MessagePriority::Normal);
        assert!(MessagePriority::Normal < MessagePriority::High);
        assert!(MessagePriority::High < MessagePriority::Critical);
    }

    #[test]
    fn serializes_roles_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn round_trips_tool_calls() {
        let call = ToolCall {
            id: "call_1".to_string(),
            tool_type: "function".to_string(),
            function: FunctionCall {
                name: "file_read".to_string(),
                arguments: r#"{"path":"a.txt"}"#.to_string(),
            },
        };
        let message = Message::assistant("", Some(vec![call]));

        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();

        let calls = parsed.tool_calls.expect("tool calls preserved");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "file_read");
    }
}
