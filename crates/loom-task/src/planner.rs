//! LLM-backed action planning for a single todo.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loom_core::tools::ToolRegistry;
use loom_core::Todo;
use loom_llm::{extract_json_object, ChatRequest, SharedChatClient};
use loom_core::Message;

use crate::mapping::map_action_to_tool;

/// An action proposed for user confirmation. `tool == None` means the action
/// could not be mapped and will be skipped with an error result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub id: String,
    pub description: String,
    pub tool: Option<String>,
    pub arguments: serde_json::Value,
    pub category: String,
}

impl ProposedAction {
    pub fn mapped(
        description: impl Into<String>,
        tool: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            tool: Some(tool.into()),
            arguments,
            category: "general".to_string(),
        }
    }

    pub fn unmapped(description: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            tool: None,
            arguments,
            category: "general".to_string(),
        }
    }
}

const PLANNER_PROMPT: &str = "You plan tool calls for the current todo. \
Respond with JSON only: {\"actions\": [{\"description\": string, \"tool\": string, \"arguments\": object}]}. \
Pick tools from the provided list. Use one action per tool call. \
If no tool applies, return {\"actions\": []}.";

/// Plan actions for a todo. The LLM's tool choice is trusted when it names a
/// registered tool; otherwise the keyword heuristic decides, and actions that
/// still have no tool are kept as unmapped (they will be skipped).
pub async fn plan_actions(
    llm: &SharedChatClient,
    tools: &ToolRegistry,
    request: &str,
    todo: &Todo,
) -> Vec<ProposedAction> {
    let schemas = tools.list_schemas();
    let tool_list = schemas
        .iter()
        .map(|s| format!("- {}: {}", s.function.name, s.function.description))
        .collect::<Vec<_>>()
        .join("\n");

    let chat_request = ChatRequest::new(vec![
        Message::system(PLANNER_PROMPT),
        Message::user(format!(
            "Original request: {request}\nCurrent todo: {}\n\nAvailable tools:\n{tool_list}",
            todo.description
        )),
    ])
    .with_temperature(0.0);

    let planned = match llm.chat(chat_request).await {
        Ok(response) => extract_json_object(&response.content)
            .and_then(|value| parse_planned_actions(&value)),
        Err(error) => {
            log::warn!("planner LLM unavailable ({error}), using keyword fallback");
            None
        }
    };

    let raw_actions = planned.unwrap_or_else(|| {
        vec![RawAction {
            description: todo.description.clone(),
            tool: None,
            arguments: serde_json::json!({}),
        }]
    });

    raw_actions
        .into_iter()
        .map(|raw| resolve_action(tools, raw))
        .collect()
}

struct RawAction {
    description: String,
    tool: Option<String>,
    arguments: serde_json::Value,
}

fn parse_planned_actions(value: &serde_json::Value) -> Option<Vec<RawAction>> {
    let actions = value.get("actions")?.as_array()?;
    Some(
        actions
            .iter()
            .filter_map(|action| {
                let description = action.get("description")?.as_str()?.to_string();
                let tool = action
                    .get("tool")
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
                let arguments = action
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                Some(RawAction {
                    description,
                    tool,
                    arguments,
                })
            })
            .collect(),
    )
}

fn resolve_action(tools: &ToolRegistry, raw: RawAction) -> ProposedAction {
    // A valid LLM tool choice is used verbatim.
    if let Some(tool) = &raw.tool {
        if tools.contains(tool) {
            return ProposedAction::mapped(raw.description, tool.clone(), raw.arguments);
        }
        log::debug!("planner chose unknown tool '{tool}', trying keyword fallback");
    }

    match map_action_to_tool(&raw.description, &raw.arguments) {
        Some(tool) if tools.contains(tool) => {
            ProposedAction::mapped(raw.description, tool, raw.arguments)
        }
        _ => ProposedAction::unmapped(raw.description, raw.arguments),
    }
}
