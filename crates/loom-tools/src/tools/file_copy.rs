use async_trait::async_trait;
use serde_json::json;
use tokio::fs;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

pub struct FileCopyTool;

#[async_trait]
impl Tool for FileCopyTool {
    fn name(&self) -> &str {
        "file_copy"
    }

    fn description(&self) -> &str {
        "Copy a file from one path to another inside the working directory."
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

        match fs::copy(&source, &destination).await {
            Ok(bytes) => Ok(ToolResult::ok(format!("copied {bytes} bytes to {to}"))),
            Err(error) => Ok(ToolResult::fail(format!(
                "failed to copy '{from}' to '{to}': {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_file_content() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("src.txt"), "payload").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = FileCopyTool
            .execute(json!({"from": "src.txt", "to": "dst.txt"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        let copied = tokio::fs::read_to_string(dir.path().join("dst.txt")).await.unwrap();
        assert_eq!(copied, "payload");
    }
}
