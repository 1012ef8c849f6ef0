use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::json;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;
use crate::tools::file_search::walk_files;

const MAX_MATCHES: usize = 100;
const MAX_FILE_BYTES: u64 = 1_048_576;

/// Searches file contents with a regex (plain text also works).
pub struct CodeSearchTool;

#[async_trait]
impl Tool for CodeSearchTool {
    fn name(&self) -> &str {
        "code_search"
    }

    fn description(&self) -> &str {
        "Search file contents for a regex pattern, reporting file, line number and line text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Regex or plain text to find" },
                "path": { "type": "string", "description": "Subdirectory to search, default '.'" },
                "case_sensitive": { "type": "boolean", "default": false }
            },
            "required": ["query"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::read_only(ToolCategory::Search)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query' parameter".to_string()))?;
        let path = args["path"].as_str().unwrap_or(".");
        let case_sensitive = args["case_sensitive"].as_bool().unwrap_or(false);

        let root = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(root) => root,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        let pattern = match RegexBuilder::new(query)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(pattern) => pattern,
            Err(error) => return Ok(ToolResult::fail(format!("invalid pattern: {error}"))),
        };

        let mut matches = Vec::new();
        walk_files(&root, &mut |file| {
            if matches.len() >= MAX_MATCHES {
                return;
            }
            let Ok(metadata) = std::fs::metadata(file) else {
                return;
            };
            if metadata.len() > MAX_FILE_BYTES {
                return;
            }
            let Ok(content) = std::fs::read_to_string(file) else {
                return;
            };
            let display = file
                .strip_prefix(&ctx.workdir)
                .unwrap_or(file)
                .to_string_lossy()
                .to_string();
            for (line_number, line) in content.lines().enumerate() {
                if matches.len() >= MAX_MATCHES {
                    break;
                }
                if pattern.is_match(line) {
                    matches.push(json!({
                        "file": display,
                        "line": line_number + 1,
                        "text": line.trim_end(),
                    }));
                }
            }
        });

        Ok(ToolResult::ok_with_metadata(
            json!(matches),
            json!({ "count": matches.len(), "truncated": matches.len() >= MAX_MATCHES }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_lines_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("main.rs"),
            "fn main() {\n    // TODO tidy\n}\n",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("lib.rs"), "pub fn helper() {}\n")
            .await
            .unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = CodeSearchTool
            .execute(json!({"query": "todo"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        let matches = result.data.unwrap();
        let matches = matches.as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["file"], "main.rs");
        assert_eq!(matches[0]["line"], 2);
    }

    #[tokio::test]
    async fn invalid_regex_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let result = CodeSearchTool
            .execute(json!({"query": "[unclosed"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
    }
}
