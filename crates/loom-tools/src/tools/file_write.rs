use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

/// Writes a file, creating parent directories as needed.
pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and parent directories) if missing. Overwrites existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to write" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
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
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' parameter".to_string()))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'content' parameter".to_string()))?;

        let resolved = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(resolved) => resolved,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(error) = fs::create_dir_all(parent).await {
                return Ok(ToolResult::fail(format!(
                    "failed to create parent directories for '{path}': {error}"
                )));
            }
        }

        match fs::write(&resolved, content).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "wrote {} bytes to {path}",
                content.len()
            ))),
            Err(error) => Ok(ToolResult::fail(format!(
                "failed to write '{path}': {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = FileWriteTool
            .execute(json!({"path": "nested/out.txt", "content": "data"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        let written = tokio::fs::read_to_string(dir.path().join("nested/out.txt"))
            .await
            .unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn metadata_requires_confirmation() {
        let metadata = FileWriteTool.metadata();
        assert!(metadata.requires_confirmation);
        assert!(metadata.has_side_effects);
    }
}
