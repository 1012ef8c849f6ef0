//! OpenAI-compatible chat completions adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use loom_core::tools::ToolCall;

use crate::client::{ChatClient, ChatRequest, ChatResponse, ChatUsage, LlmError, ResponseMessage, Result};

pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: base_url.into(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(&request.tools).unwrap_or_default();
        }
        if let Some(tool_choice) = &request.tool_choice {
            body["tool_choice"] = serde_json::json!(tool_choice);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request_body(&request);
        log::debug!(
            "chat request: {} messages, {} tools",
            request.messages.len(),
            request.tools.len()
        );

        let mut http_request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);

        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")));
        }

        let completion: OpenAiCompletion = response.json().await?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice.message.tool_calls.filter(|calls| !calls.is_empty());

        Ok(ChatResponse {
            content: content.clone(),
            message: ResponseMessage {
                content,
                tool_calls,
            },
            usage: completion.usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiCompletion {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello there"}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri());
        let response = client
            .chat(ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(response.content, "hello there");
        assert!(!response.has_tool_calls());
        assert_eq!(response.usage.unwrap().total_tokens, 8);
    }

    #[tokio::test]
    async fn parses_tool_call_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "file_read", "arguments": "{\"path\":\"hello.txt\"}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri());
        let response = client
            .chat(ChatRequest::new(vec![Message::user("read hello.txt")]))
            .await
            .unwrap();

        assert!(response.has_tool_calls());
        let calls = response.message.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "file_read");
    }

    #[tokio::test]
    async fn surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri());
        let result = client.chat(ChatRequest::new(vec![Message::user("hi")])).await;

        assert!(matches!(result, Err(LlmError::Api(_))));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri());
        let result = client.chat(ChatRequest::new(vec![Message::user("hi")])).await;

        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }
}
