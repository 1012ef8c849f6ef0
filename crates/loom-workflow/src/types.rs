//! Workflow definitions and execution state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    /// Seed variables, overridable at start time.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Default per-step timeout when a step does not set its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Skips the step when it evaluates to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Output mapping: variable name → dotted path into the step result.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Agent {
        agent_id: String,
        task: String,
    },
    Tool {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// Record-only pipeline marker.
    Task {
        description: String,
    },
    Parallel {
        steps: Vec<WorkflowStep>,
    },
    Sequential {
        steps: Vec<WorkflowStep>,
    },
    Condition {
        expression: String,
    },
    Loop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        steps: Vec<WorkflowStep>,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        check_interval_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_wait_ms: Option<u64>,
    },
}

impl StepKind {
    pub fn tag(&self) -> &'static str {
        match self {
            StepKind::Agent { .. } => "agent",
            StepKind::Tool { .. } => "tool",
            StepKind::Task { .. } => "task",
            StepKind::Parallel { .. } => "parallel",
            StepKind::Sequential { .. } => "sequential",
            StepKind::Condition { .. } => "condition",
            StepKind::Loop { .. } => "loop",
            StepKind::Wait { .. } => "wait",
        }
    }

    pub fn sub_steps(&self) -> &[WorkflowStep] {
        match self {
            StepKind::Parallel { steps }
            | StepKind::Sequential { steps }
            | StepKind::Loop { steps, .. } => steps,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Case-insensitive patterns the error message must match for a retry;
    /// empty retries every error.
    #[serde(default)]
    pub retry_on: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            base_delay_ms: default_base_delay_ms(),
            retry_on: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt) + 1),
            Backoff::Exponential => self
                .base_delay_ms
                .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX)),
        };
        Duration::from_millis(ms)
    }

    pub fn matches_error(&self, message: &str) -> bool {
        if self.retry_on.is_empty() {
            return true;
        }
        self.retry_on.iter().any(|pattern| {
            match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(pattern) => pattern.is_match(message),
                // A pattern that is not a valid regex still matches as a
                // case-insensitive substring.
                Err(_) => message.to_lowercase().contains(&pattern.to_lowercase()),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// Mutable state of one workflow execution. Owned by the engine; mutated only
/// by the execution task driving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    pub execution_id: String,
    pub workflow: Workflow,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub step_results: HashMap<String, serde_json::Value>,
    pub completed_steps: HashSet<String>,
    pub failed_steps: HashSet<String>,
    pub skipped_steps: HashSet<String>,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecutionState {
    pub fn new(
        execution_id: impl Into<String>,
        workflow: Workflow,
        initial_variables: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut variables = workflow.variables.clone();
        variables.extend(initial_variables);
        Self {
            execution_id: execution_id.into(),
            workflow,
            variables,
            step_results: HashMap::new(),
            completed_steps: HashSet::new(),
            failed_steps: HashSet::new(),
            skipped_steps: HashSet::new(),
            status: WorkflowStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Interpolation and condition scope: the variables plus `step_results`.
    pub fn scope(&self) -> serde_json::Value {
        let mut scope = serde_json::Map::new();
        for (key, value) in &self.variables {
            scope.insert(key.clone(), value.clone());
        }
        scope.insert(
            "step_results".to_string(),
            serde_json::to_value(&self.step_results).unwrap_or_default(),
        );
        serde_json::Value::Object(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays() {
        let fixed = RetryPolicy {
            backoff: Backoff::Fixed,
            base_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(fixed.delay(0), Duration::from_millis(100));
        assert_eq!(fixed.delay(3), Duration::from_millis(100));

        let linear = RetryPolicy {
            backoff: Backoff::Linear,
            base_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(linear.delay(0), Duration::from_millis(100));
        assert_eq!(linear.delay(2), Duration::from_millis(300));

        let exponential = RetryPolicy {
            backoff: Backoff::Exponential,
            base_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(exponential.delay(0), Duration::from_millis(100));
        assert_eq!(exponential.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn retry_on_matches_case_insensitively() {
        let policy = RetryPolicy {
            retry_on: vec!["Timeout".to_string(), "connection".to_string()],
            ..RetryPolicy::default()
        };
        assert!(policy.matches_error("step timed out: TIMEOUT after 5s"));
        assert!(policy.matches_error("Connection refused"));
        assert!(!policy.matches_error("permission denied"));

        let match_all = RetryPolicy::default();
        assert!(match_all.matches_error("anything"));
    }

    #[test]
    fn step_kind_round_trips_through_serde() {
        let json = serde_json::json!({
            "id": "wait-1",
            "type": "wait",
            "duration_ms": 500
        });
        let step: WorkflowStep = serde_json::from_value(json).unwrap();
        assert_eq!(step.kind.tag(), "wait");

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["type"], "wait");
        assert_eq!(back["duration_ms"], 500);
    }

    #[test]
    fn state_seeds_variables_from_workflow_and_overrides() {
        let mut workflow_vars = serde_json::Map::new();
        workflow_vars.insert("a".to_string(), serde_json::json!(1));
        workflow_vars.insert("b".to_string(), serde_json::json!(2));

        let workflow = Workflow {
            id: "wf".to_string(),
            name: String::new(),
            steps: vec![],
            variables: workflow_vars,
            timeout_ms: None,
        };

        let mut overrides = serde_json::Map::new();
        overrides.insert("b".to_string(), serde_json::json!(20));

        let state = WorkflowExecutionState::new("exec-1", workflow, overrides);
        assert_eq!(state.variables["a"], 1);
        assert_eq!(state.variables["b"], 20);

        let scope = state.scope();
        assert!(scope.get("step_results").is_some());
    }
}
