use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

/// Reads a text file relative to the working directory.
pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the content of a text file. The path is relative to the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to read" }
            },
            "required": ["path"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::read_only(ToolCategory::FileOperations)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' parameter".to_string()))?;

        let resolved = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(resolved) => resolved,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        match fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(error) => Ok(ToolResult::fail(format!(
                "failed to read '{path}': {error}"
            ))),
        }
    }
}
