use serde::{Deserialize, Serialize};

/// A tool invocation as emitted by the LLM (OpenAI wire shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text, parsed at dispatch time.
    pub arguments: String,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            tool_type: default_tool_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    FileOperations,
    Search,
    Git,
    CommandExecution,
    General,
}

impl Default for ToolCategory {
    fn default() -> Self {
        ToolCategory::General
    }
}

/// Static descriptor advertised by a tool alongside its schema.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolMetadata {
    pub category: ToolCategory,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub has_side_effects: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ToolMetadata {
    pub fn read_only(category: ToolCategory) -> Self {
        Self {
            category,
            version: default_version(),
            requires_confirmation: false,
            has_side_effects: false,
        }
    }

    pub fn mutating(category: ToolCategory) -> Self {
        Self {
            category,
            version: default_version(),
            requires_confirmation: true,
            has_side_effects: true,
        }
    }
}

/// Outcome of a tool execution. Success carries a data payload, failure an
/// error string. Never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            metadata: None,
            error: None,
        }
    }

    pub fn ok_with_metadata(
        data: impl Into<serde_json::Value>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            metadata: None,
            error: Some(error.into()),
        }
    }

    /// Text form appended to context as the observation for this result.
    /// Failures surface the error verbatim so the next think sees it.
    pub fn content_for_llm(&self) -> String {
        if self.success {
            match &self.data {
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}
