use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Validation(String),

    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Concurrency limit reached ({0} running workflows)")]
    ConcurrencyLimit(usize),

    #[error("Step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("Step '{step_id}' timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Cancellation is terminal and never retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }
}
