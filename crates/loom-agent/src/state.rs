use serde::{Deserialize, Serialize};

/// Agent loop state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Thinking,
    Acting,
    Observing,
    Paused,
    Stopped,
    Error,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Stopped)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Loop until a final response and auto-dequeue the next task.
    Autonomous,
    /// Loop until a final response, without auto-dequeueing.
    Interactive,
    /// Pause after every observe; `step()` runs one more iteration.
    Step,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Autonomous
    }
}
