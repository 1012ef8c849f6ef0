use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

/// Lists directory entries with their kind.
pub struct FileListTool;

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Defaults to the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list, default '.'" }
            }
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
        let path = args["path"].as_str().unwrap_or(".");

        let resolved = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(resolved) => resolved,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        let mut reader = match fs::read_dir(&resolved).await {
            Ok(reader) => reader,
            Err(error) => {
                return Ok(ToolResult::fail(format!(
                    "failed to list '{path}': {error}"
                )))
            }
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = reader.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let kind = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => "dir",
                Ok(_) => "file",
                Err(_) => "unknown",
            };
            entries.push(json!({ "name": name, "type": kind }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolResult::ok(json!(entries)))
    }
}
