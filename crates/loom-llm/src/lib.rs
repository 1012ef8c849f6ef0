pub mod client;
pub mod openai;
pub mod parse;

pub use client::{
    ChatClient, ChatRequest, ChatResponse, ChatUsage, EmbeddingProvider, LlmError, ResponseMessage,
    Result, SharedChatClient,
};
pub use openai::OpenAiClient;
pub use parse::extract_json_object;
