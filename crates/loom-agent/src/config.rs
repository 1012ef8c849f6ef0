use std::path::PathBuf;
use std::time::Duration;

use crate::state::ExecutionMode;

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub mode: ExecutionMode,
    /// Working directory handed to tools.
    pub workdir: PathBuf,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            temperature: None,
            max_tokens: None,
            mode: ExecutionMode::default(),
            workdir: PathBuf::from("."),
        }
    }
}
