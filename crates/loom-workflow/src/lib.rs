pub mod condition;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod interpolate;
pub mod types;
pub mod validation;

pub use condition::evaluate_condition;
pub use engine::{StartOptions, WorkflowEngine, WorkflowEngineConfig, WorkflowProgress};
pub use error::WorkflowError;
pub use events::{EventBus, WorkflowEvent};
pub use executor::{AgentFactory, StepDisposition, WorkflowExecutor};
pub use interpolate::{interpolate_string, interpolate_value, lookup_path};
pub use types::{
    Backoff, RetryPolicy, StepKind, Workflow, WorkflowExecutionState, WorkflowStatus, WorkflowStep,
};
pub use validation::{topological_order, validate_workflow};
