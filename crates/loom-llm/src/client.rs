use std::sync::Arc;

use async_trait::async_trait;
use loom_core::tools::{ToolCall, ToolSchema};
use loom_core::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Convenience copy of `message.content`.
    pub content: String,
    pub message: ResponseMessage,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        self.message
            .tool_calls
            .as_ref()
            .map_or(false, |calls| !calls.is_empty())
    }
}

/// The single operation the runtime consumes from an LLM transport.
/// Implementations must be safe for concurrent calls from multiple
/// executions.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

pub type SharedChatClient = Arc<dyn ChatClient>;

/// Companion capability for the semantic pruning strategy.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_tool_calls_requires_non_empty_list() {
        let mut response = ChatResponse::default();
        assert!(!response.has_tool_calls());

        response.message.tool_calls = Some(vec![]);
        assert!(!response.has_tool_calls());

        response.message.tool_calls = Some(vec![ToolCall::new(
            "call_1",
            "file_read",
            serde_json::json!({}),
        )]);
        assert!(response.has_tool_calls());
    }

    #[test]
    fn chat_request_builder_sets_fields() {
        let request = ChatRequest::new(vec![Message::user("hi")])
            .with_temperature(0.2)
            .with_max_tokens(512);

        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
    }
}
