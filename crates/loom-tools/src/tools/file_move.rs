use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

pub struct FileMoveTool;

#[async_trait]
impl Tool for FileMoveTool {
    fn name(&self) -> &str {
        "file_move"
    }

    fn description(&self) -> &str {
        "Move or rename a file inside the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Source path" },
                "to": { "type": "string", "description": "Destination path" }
            },
            "required": ["from", "to"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::mutating(ToolCategory::FileOperations)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let from = args["from"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'from' parameter".to_string()))?;
        let to = args["to"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'to' parameter".to_string()))?;

        let source = match resolve_in_workdir(&ctx.workdir, from) {
            Ok(path) => path,
            Err(error) => return Ok(ToolResult::fail(error)),
        };
        let destination = match resolve_in_workdir(&ctx.workdir, to) {
            Ok(path) => path,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        if let Some(parent) = destination.parent() {
            let _ = fs::create_dir_all(parent).await;
        }

        match fs::rename(&source, &destination).await {
            Ok(()) => Ok(ToolResult::ok(format!("moved {from} to {to}"))),
            Err(error) => Ok(ToolResult::fail(format!(
                "failed to move '{from}' to '{to}': {error}"
            ))),
        }
    }
}
