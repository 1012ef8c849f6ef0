//! Git tools shelling out to the `git` binary in the working directory.

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

async fn run_git(ctx: &ToolContext, args: &[&str]) -> ToolResult {
    let output = Command::new("git")
        .args(args)
        .current_dir(&ctx.workdir)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            ToolResult::ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => ToolResult::fail(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Err(error) => ToolResult::fail(format!("failed to run git: {error}")),
    }
}

pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the git working tree status (porcelain format)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::read_only(ToolCategory::Git)
    }

    async fn execute(
        &self,
        _args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        Ok(run_git(ctx, &["status", "--porcelain"]).await)
    }
}

pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show unstaged changes, optionally limited to one path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Limit the diff to this path" }
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::read_only(ToolCategory::Git)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let mut git_args = vec!["diff"];
        if let Some(path) = args["path"].as_str() {
            git_args.push("--");
            git_args.push(path);
        }
        Ok(run_git(ctx, &git_args).await)
    }
}

pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commits, one line each."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Number of commits, default 20" }
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::read_only(ToolCategory::Git)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let limit = args["limit"].as_u64().unwrap_or(20).to_string();
        Ok(run_git(ctx, &["log", "--oneline", "-n", &limit]).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_outside_a_repo_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = GitStatusTool.execute(json!({}), &ctx).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn status_inside_a_repo_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let init = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(dir.path())
            .output()
            .await;
        if init.map(|o| !o.status.success()).unwrap_or(true) {
            // No usable git binary in this environment.
            return;
        }
        tokio::fs::write(dir.path().join("new.txt"), "x").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = GitStatusTool.execute(json!({}), &ctx).await.unwrap();

        assert!(result.success);
        assert!(result.content_for_llm().contains("new.txt"));
    }
}
