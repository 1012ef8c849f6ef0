use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

pub struct FileDeleteTool;

#[async_trait]
impl Tool for FileDeleteTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a file. Directories are deleted only with recursive=true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to delete" },
                "recursive": { "type": "boolean", "description": "Delete directories recursively", "default": false }
            },
            "required": ["path"]
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
        let recursive = args["recursive"].as_bool().unwrap_or(false);

        let resolved = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(resolved) => resolved,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        let metadata = match fs::metadata(&resolved).await {
            Ok(metadata) => metadata,
            Err(error) => {
                return Ok(ToolResult::fail(format!(
                    "failed to delete '{path}': {error}"
                )))
            }
        };

        let outcome = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&resolved).await
            } else {
                return Ok(ToolResult::fail(format!(
                    "'{path}' is a directory; pass recursive=true to delete it"
                )));
            }
        } else {
            fs::remove_file(&resolved).await
        };

        match outcome {
            Ok(()) => Ok(ToolResult::ok(format!("deleted {path}"))),
            Err(error) => Ok(ToolResult::fail(format!(
                "failed to delete '{path}': {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        tokio::fs::write(&target, "x").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = FileDeleteTool
            .execute(json!({"path": "gone.txt"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn missing_target_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = FileDeleteTool
            .execute(json!({"path": "absent.txt"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
    }

    #[tokio::test]
    async fn directories_need_recursive() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        let ctx = ToolContext::new(dir.path());

        let refused = FileDeleteTool
            .execute(json!({"path": "sub"}), &ctx)
            .await
            .unwrap();
        assert!(!refused.success);

        let removed = FileDeleteTool
            .execute(json!({"path": "sub", "recursive": true}), &ctx)
            .await
            .unwrap();
        assert!(removed.success);
    }
}
