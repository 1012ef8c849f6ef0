use thiserror::Error;

use crate::tools::{ToolCall, ToolContext, ToolRegistry, ToolResult};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Tool execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Parse the JSON argument text carried by a tool call. Empty arguments are
/// treated as an empty object.
pub fn parse_tool_args(arguments: &str) -> Result<serde_json::Value> {
    let args_raw = arguments.trim();

    if args_raw.is_empty() {
        return Ok(serde_json::json!({}));
    }

    serde_json::from_str(args_raw)
        .map_err(|error| ToolError::InvalidArguments(format!("Invalid JSON arguments: {error}")))
}

/// Dispatch a tool call through the shared contract: look up by name,
/// validate arguments, race execution against the context timeout, and
/// return the tool's result verbatim. A `success == false` result is a valid
/// outcome, never translated into a hard error.
pub async fn dispatch_tool_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    ctx: &ToolContext,
) -> Result<ToolResult> {
    let tool = registry
        .get(&call.function.name)
        .ok_or_else(|| ToolError::NotFound(call.function.name.clone()))?;

    let args = parse_tool_args(&call.function.arguments)?;
    tool.validate(&args).map_err(ToolError::InvalidArguments)?;

    if ctx.cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    let timeout = ctx.timeout;
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
        outcome = tokio::time::timeout(timeout, tool.execute(args, ctx)) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(timeout.as_millis() as u64)),
        },
    }
}
