use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

/// Runs a shell command in the working directory. Requires confirmation.
pub struct CommandExecuteTool;

#[async_trait]
impl Tool for CommandExecuteTool {
    fn name(&self) -> &str {
        "command_execute"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and capture its output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command line to run" }
            },
            "required": ["command"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::mutating(ToolCategory::CommandExecution)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'command' parameter".to_string()))?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workdir)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);

                if output.status.success() {
                    Ok(ToolResult::ok_with_metadata(
                        stdout,
                        json!({ "exit_code": exit_code, "stderr": stderr }),
                    ))
                } else {
                    Ok(ToolResult::fail(format!(
                        "command exited with {exit_code}: {}",
                        if stderr.trim().is_empty() { &stdout } else { &stderr }.trim()
                    )))
                }
            }
            Err(error) => Ok(ToolResult::fail(format!("failed to spawn command: {error}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = CommandExecuteTool
            .execute(json!({"command": "echo hello"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data, Some(json!("hello\n")));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = CommandExecuteTool
            .execute(json!({"command": "exit 3"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains('3'));
    }

    #[tokio::test]
    async fn runs_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("marker.txt"), "").await.unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = CommandExecuteTool
            .execute(json!({"command": "ls"}), &ctx)
            .await
            .unwrap();

        assert!(result.content_for_llm().contains("marker.txt"));
    }
}
