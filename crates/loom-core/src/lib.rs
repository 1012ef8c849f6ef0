pub mod error;
pub mod events;
pub mod message;
pub mod todo;
pub mod token;
pub mod tools;

pub use error::AgentError;
pub use events::{AgentEvent, TokenUsage};
pub use message::{Message, MessagePriority, Role};
pub use todo::{Todo, TodoList, TodoStatus};
pub use token::{HeuristicTokenCounter, SharedTokenCounter, TokenCounter};
pub use tools::{
    dispatch_tool_call, parse_tool_args, FunctionCall, FunctionSchema, RegistryError, Tool,
    ToolCall, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolRegistry, ToolResult,
    ToolSchema,
};
