//! Explicit registration of the builtin tool set.

use loom_core::tools::{RegistryError, ToolRegistry};

use crate::tools::{
    CodeSearchTool, CommandExecuteTool, FileCopyTool, FileDeleteTool, FileListTool, FileMoveTool,
    FileReadTool, FileSearchTool, FileWriteTool, GitDiffTool, GitLogTool, GitStatusTool,
};

/// Register every builtin tool. Fails fast on a name collision, leaving the
/// registry as it was up to that point.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), RegistryError> {
    registry.register(FileReadTool)?;
    registry.register(FileWriteTool)?;
    registry.register(FileListTool)?;
    registry.register(FileDeleteTool)?;
    registry.register(FileCopyTool)?;
    registry.register(FileMoveTool)?;
    registry.register(FileSearchTool)?;
    registry.register(CodeSearchTool)?;
    registry.register(GitStatusTool)?;
    registry.register(GitDiffTool)?;
    registry.register(GitLogTool)?;
    registry.register(CommandExecuteTool)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_full_builtin_set() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry).unwrap();

        for name in [
            "file_read",
            "file_write",
            "file_list",
            "file_delete",
            "file_copy",
            "file_move",
            "file_search",
            "code_search",
            "git_status",
            "git_diff",
            "git_log",
            "command_execute",
        ] {
            assert!(registry.contains(name), "missing builtin tool {name}");
        }
        assert_eq!(registry.len(), 12);
    }

    #[test]
    fn double_registration_fails() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry).unwrap();
        assert!(register_builtin_tools(&registry).is_err());
    }
}
