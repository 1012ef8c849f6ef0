use thiserror::Error;

use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Cancelled")]
    Cancelled,
}
