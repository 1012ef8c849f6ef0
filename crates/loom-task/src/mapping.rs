//! Deterministic keyword fallback from natural-language action descriptions
//! to tool names. Applied only when the planning LLM did not produce a valid
//! tool name; rules are checked in priority order over the lowercased text.

pub fn map_action_to_tool(description: &str, arguments: &serde_json::Value) -> Option<&'static str> {
    let text = description.to_lowercase();

    if text.contains("list") && (text.contains("file") || text.contains("director")) {
        return Some("file_list");
    }
    if text.contains("read") && text.contains("file") {
        return Some("file_read");
    }
    if (text.contains("write") || text.contains("create")) && text.contains("file") {
        return Some("file_write");
    }
    if text.contains("delete") && text.contains("file") {
        return Some("file_delete");
    }
    if text.contains("copy") && text.contains("file") {
        return Some("file_copy");
    }
    if text.contains("move") && text.contains("file") {
        return Some("file_move");
    }
    if text.contains("git") {
        if text.contains("status") {
            return Some("git_status");
        }
        if text.contains("diff") {
            return Some("git_diff");
        }
        if text.contains("log") {
            return Some("git_log");
        }
    }
    if text.contains("search") && text.contains("code") {
        return Some("code_search");
    }
    if text.contains("search") && text.contains("file") {
        return Some("file_search");
    }
    if (text.contains("run") || text.contains("execute")) && arguments.get("command").is_some() {
        return Some("command_execute");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_file_verbs() {
        let none = json!({});
        assert_eq!(map_action_to_tool("Read file hello.txt", &none), Some("file_read"));
        assert_eq!(map_action_to_tool("write the file out", &none), Some("file_write"));
        assert_eq!(map_action_to_tool("Create a file named x", &none), Some("file_write"));
        assert_eq!(map_action_to_tool("delete the file old.txt", &none), Some("file_delete"));
        assert_eq!(map_action_to_tool("copy file a to b", &none), Some("file_copy"));
        assert_eq!(map_action_to_tool("move file a to b", &none), Some("file_move"));
    }

    #[test]
    fn list_outranks_read() {
        let none = json!({});
        assert_eq!(
            map_action_to_tool("list files in the directory to read", &none),
            Some("file_list")
        );
        assert_eq!(
            map_action_to_tool("list the directory contents", &none),
            Some("file_list")
        );
    }

    #[test]
    fn maps_git_subcommands() {
        let none = json!({});
        assert_eq!(map_action_to_tool("check git status", &none), Some("git_status"));
        assert_eq!(map_action_to_tool("show the git diff", &none), Some("git_diff"));
        assert_eq!(map_action_to_tool("inspect git log", &none), Some("git_log"));
    }

    #[test]
    fn maps_search_variants() {
        let none = json!({});
        assert_eq!(map_action_to_tool("search code for TODO", &none), Some("code_search"));
        assert_eq!(map_action_to_tool("search for the file config", &none), Some("file_search"));
    }

    #[test]
    fn command_rule_needs_a_command_argument() {
        assert_eq!(
            map_action_to_tool("run the build", &json!({"command": "make"})),
            Some("command_execute")
        );
        assert_eq!(map_action_to_tool("run the build", &json!({})), None);
    }

    #[test]
    fn unmapped_actions_return_none() {
        assert_eq!(map_action_to_tool("ponder the universe", &json!({})), None);
        // Non-English input falls through to the LLM planner.
        assert_eq!(map_action_to_tool("lies die Datei", &json!({})), None);
    }
}
