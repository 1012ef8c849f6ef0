use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use loom_core::tools::{Tool, ToolCategory, ToolContext, ToolError, ToolMetadata, ToolResult};

use crate::paths::resolve_in_workdir;

const MAX_RESULTS: usize = 200;

/// Finds files whose names contain a pattern.
pub struct FileSearchTool;

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Find files by name substring, searching recursively from the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Case-insensitive name substring" },
                "path": { "type": "string", "description": "Subdirectory to search, default '.'" }
            },
            "required": ["pattern"]
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
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'pattern' parameter".to_string()))?
            .to_lowercase();
        let path = args["path"].as_str().unwrap_or(".");

        let root = match resolve_in_workdir(&ctx.workdir, path) {
            Ok(root) => root,
            Err(error) => return Ok(ToolResult::fail(error)),
        };

        let mut matches = Vec::new();
        walk_files(&root, &mut |file| {
            if matches.len() >= MAX_RESULTS {
                return;
            }
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if name.contains(&pattern) {
                let display = file
                    .strip_prefix(&ctx.workdir)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .to_string();
                matches.push(json!(display));
            }
        });

        Ok(ToolResult::ok_with_metadata(
            json!(matches),
            json!({ "count": matches.len(), "truncated": matches.len() >= MAX_RESULTS }),
        ))
    }
}

/// Depth-first file walk, skipping hidden directories.
pub(crate) fn walk_files(root: &Path, visit: &mut dyn FnMut(&PathBuf)) {
    let Ok(reader) = std::fs::read_dir(root) else {
        return;
    };

    let mut entries: Vec<_> = reader.flatten().collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => walk_files(&path, visit),
            Ok(file_type) if file_type.is_file() => visit(&path),
            _ => {}
        }
    }
}
