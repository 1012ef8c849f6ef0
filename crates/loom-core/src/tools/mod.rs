pub mod dispatch;
pub mod registry;
pub mod types;

pub use dispatch::{dispatch_tool_call, parse_tool_args, ToolError};
pub use registry::{RegistryError, SharedTool, Tool, ToolContext, ToolRegistry};
pub use types::{
    FunctionCall, FunctionSchema, ToolCall, ToolCategory, ToolMetadata, ToolResult, ToolSchema,
};
