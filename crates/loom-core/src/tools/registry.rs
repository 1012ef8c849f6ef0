use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tools::{FunctionSchema, ToolCategory, ToolError, ToolMetadata, ToolResult, ToolSchema};

/// Execution context handed to every tool invocation. The dispatcher enforces
/// `timeout` regardless of whether the tool honours it natively.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Check arguments against the parameter schema before execution.
    /// The default implementation rejects missing required parameters.
    fn validate(&self, args: &serde_json::Value) -> Result<(), String> {
        let schema = self.parameters_schema();
        let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
            return Ok(());
        };

        for name in required.iter().filter_map(|n| n.as_str()) {
            if args.get(name).map_or(true, |v| v.is_null()) {
                return Err(format!("missing required parameter '{name}'"));
            }
        }

        Ok(())
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            schema_type: "function".to_string(),
            function: FunctionSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

pub type SharedTool = Arc<dyn Tool>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool with name '{0}' already registered")]
    DuplicateTool(String),

    #[error("invalid tool: {0}")]
    InvalidTool(String),
}

/// Name-keyed tool lookup shared by agent planning and action execution.
pub struct ToolRegistry {
    tools: DashMap<String, SharedTool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn register<T>(&self, tool: T) -> Result<(), RegistryError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&self, tool: SharedTool) -> Result<(), RegistryError> {
        let name = tool.name().trim();

        if name.is_empty() {
            return Err(RegistryError::InvalidTool(
                "tool name cannot be empty".to_string(),
            ));
        }

        match self.tools.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateTool(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(tool);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<SharedTool> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .iter()
            .map(|entry| entry.value().to_schema())
            .collect();
        schemas.sort_by(|left, right| left.function.name.cmp(&right.function.name));
        schemas
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn list_by_category(&self, category: ToolCategory) -> Vec<SharedTool> {
        let mut tools: Vec<SharedTool> = self
            .tools
            .iter()
            .filter(|entry| entry.value().metadata().category == category)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        tools.sort_by(|left, right| left.name().cmp(right.name()));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    struct TestTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for TestTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": ["path"]
            })
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("ok"))
        }
    }

    #[test]
    fn register_and_get() {
        let registry = ToolRegistry::new();
        assert!(registry.register(TestTool { name: "test_tool" }).is_ok());
        assert!(registry.get("test_tool").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn duplicate_registration_fails_and_keeps_state() {
        let registry = ToolRegistry::new();
        registry.register(TestTool { name: "dup" }).unwrap();

        let duplicate = registry.register(TestTool { name: "dup" });

        assert!(matches!(duplicate, Err(RegistryError::DuplicateTool(name)) if name == "dup"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("dup").is_some());
    }

    #[test]
    fn rejects_empty_tool_name() {
        let registry = ToolRegistry::new();
        let result = registry.register(TestTool { name: "" });
        assert!(matches!(result, Err(RegistryError::InvalidTool(_))));
    }

    #[test]
    fn list_schemas_is_sorted() {
        let registry = ToolRegistry::new();
        registry.register(TestTool { name: "tool_b" }).unwrap();
        registry.register(TestTool { name: "tool_a" }).unwrap();

        let schemas = registry.list_schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].function.name, "tool_a");
        assert_eq!(schemas[1].function.name, "tool_b");
    }

    #[test]
    fn list_by_category_filters_tools() {
        struct Categorised;

        #[async_trait]
        impl Tool for Categorised {
            fn name(&self) -> &str {
                "searcher"
            }
            fn description(&self) -> &str {
                "search tool"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                json!({ "type": "object", "properties": {} })
            }
            fn metadata(&self) -> crate::tools::ToolMetadata {
                crate::tools::ToolMetadata::read_only(crate::tools::ToolCategory::Search)
            }
            async fn execute(
                &self,
                _args: serde_json::Value,
                _ctx: &ToolContext,
            ) -> Result<ToolResult, ToolError> {
                Ok(ToolResult::ok("ok"))
            }
        }

        let registry = ToolRegistry::new();
        registry.register(TestTool { name: "general" }).unwrap();
        registry.register(Categorised).unwrap();

        let search = registry.list_by_category(crate::tools::ToolCategory::Search);
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].name(), "searcher");
        assert!(registry
            .list_by_category(crate::tools::ToolCategory::Git)
            .is_empty());
    }

    #[test]
    fn default_validate_rejects_missing_required() {
        let tool = TestTool { name: "t" };
        assert!(tool.validate(&json!({"path": "a.txt"})).is_ok());
        let err = tool.validate(&json!({})).unwrap_err();
        assert!(err.contains("path"));
    }
}
