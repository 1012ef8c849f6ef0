//! Per-variant step execution: condition gate, retry with backoff, timeout,
//! cancellation, and output mapping around each dispatch.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use loom_core::tools::{dispatch_tool_call, ToolCall, ToolContext, ToolError, ToolRegistry};

use crate::condition::evaluate_condition;
use crate::error::WorkflowError;
use crate::events::{EventBus, WorkflowEvent};
use crate::interpolate::{interpolate_string, interpolate_value, lookup_path};
use crate::types::{StepKind, WorkflowExecutionState, WorkflowStep};

/// Seam through which workflow steps reach agents. The executor holds only
/// this handle; no back-reference to any agent is stored.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn run_agent_task(
        &self,
        agent_id: &str,
        task: &str,
    ) -> Result<serde_json::Value, String>;
}

/// How a completed `run_step` left the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDisposition {
    Completed,
    Skipped,
    /// Failed with `continue_on_error`; the flow goes on.
    FailedButContinuing,
}

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub struct WorkflowExecutor {
    tools: Arc<ToolRegistry>,
    agents: Option<Arc<dyn AgentFactory>>,
    default_step_timeout: Duration,
    workdir: PathBuf,
}

impl WorkflowExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            agents: None,
            default_step_timeout: Duration::from_secs(60),
            workdir: PathBuf::from("."),
        }
    }

    pub fn with_agents(mut self, agents: Arc<dyn AgentFactory>) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout = timeout;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    /// Execute one step: condition gate, retries, timeout, bookkeeping and
    /// events. Errors propagate only when the step does not continue on
    /// error; cancellation always propagates.
    pub async fn run_step(
        &self,
        step: &WorkflowStep,
        state: &mut WorkflowExecutionState,
        cancel: &CancellationToken,
        bus: Option<&EventBus>,
    ) -> Result<StepDisposition, WorkflowError> {
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        if let Some(expression) = &step.condition {
            let holds = evaluate_condition(expression, &state.scope())?;
            if !holds {
                state.skipped_steps.insert(step.id.clone());
                emit(bus, WorkflowEvent::StepSkipped {
                    execution_id: state.execution_id.clone(),
                    step_id: step.id.clone(),
                });
                log::debug!("step '{}' skipped by condition", step.id);
                return Ok(StepDisposition::Skipped);
            }
        }

        emit(bus, WorkflowEvent::StepStarted {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
        });

        let max_attempts = step.retry.as_ref().map_or(1, |r| r.max_attempts.max(1));
        let mut attempt = 0;

        let error = loop {
            match self.execute_timed(step, state, cancel).await {
                Ok(result) => {
                    self.apply_outputs(step, &result, state);
                    state.step_results.insert(step.id.clone(), result);
                    state.completed_steps.insert(step.id.clone());
                    emit(bus, WorkflowEvent::StepCompleted {
                        execution_id: state.execution_id.clone(),
                        step_id: step.id.clone(),
                    });
                    return Ok(StepDisposition::Completed);
                }
                Err(error) if error.is_cancellation() => return Err(error),
                Err(error) => {
                    let retryable = step
                        .retry
                        .as_ref()
                        .map_or(false, |policy| policy.matches_error(&error.to_string()));
                    if attempt + 1 < max_attempts && retryable {
                        let delay = step.retry.as_ref().expect("retry policy").delay(attempt);
                        log::debug!(
                            "step '{}' attempt {} failed ({error}), retrying in {:?}",
                            step.id,
                            attempt + 1,
                            delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                        }
                        attempt += 1;
                        continue;
                    }
                    break error;
                }
            }
        };

        state.failed_steps.insert(step.id.clone());
        state
            .step_results
            .insert(step.id.clone(), serde_json::json!({ "error": error.to_string() }));
        emit(bus, WorkflowEvent::StepFailed {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
            error: error.to_string(),
        });

        if step.continue_on_error {
            log::debug!("step '{}' failed but continues: {error}", step.id);
            Ok(StepDisposition::FailedButContinuing)
        } else {
            Err(error)
        }
    }

    async fn execute_timed(
        &self,
        step: &WorkflowStep,
        state: &mut WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let timeout_ms = step
            .timeout_ms
            .or(state.workflow.timeout_ms)
            .unwrap_or(self.default_step_timeout.as_millis() as u64);

        let cancel_guard = cancel.clone();
        tokio::select! {
            _ = cancel_guard.cancelled() => Err(WorkflowError::Cancelled),
            outcome = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.execute_kind(step, state, cancel),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(WorkflowError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms,
                }),
            },
        }
    }

    fn execute_kind<'a>(
        &'a self,
        step: &'a WorkflowStep,
        state: &'a mut WorkflowExecutionState,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<serde_json::Value, WorkflowError>> {
        Box::pin(async move {
            match &step.kind {
                StepKind::Tool { tool, args } => self.execute_tool(step, tool, args, state, cancel).await,
                StepKind::Agent { agent_id, task } => {
                    self.execute_agent(step, agent_id, task, state).await
                }
                StepKind::Task { description } => {
                    let description = interpolate_string(description, &state.scope());
                    Ok(serde_json::json!({ "description": description, "completed": true }))
                }
                StepKind::Parallel { steps } => self.execute_parallel(steps, state, cancel).await,
                StepKind::Sequential { steps } => {
                    self.execute_sequential(steps, state, cancel).await
                }
                StepKind::Condition { expression } => {
                    let holds = evaluate_condition(expression, &state.scope())?;
                    Ok(serde_json::Value::Bool(holds))
                }
                StepKind::Loop {
                    items,
                    count,
                    steps,
                } => self.execute_loop(step, items.as_ref(), *count, steps, state, cancel).await,
                StepKind::Wait {
                    duration_ms,
                    condition,
                    check_interval_ms,
                    max_wait_ms,
                } => {
                    self.execute_wait(
                        step,
                        *duration_ms,
                        condition.as_deref(),
                        *check_interval_ms,
                        *max_wait_ms,
                        state,
                        cancel,
                    )
                    .await
                }
            }
        })
    }

    async fn execute_tool(
        &self,
        step: &WorkflowStep,
        tool: &str,
        args: &serde_json::Value,
        state: &WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let args = interpolate_value(args, &state.scope());
        let call = ToolCall::new(format!("wf_{}", step.id), tool, args);
        let ctx = ToolContext::new(self.workdir.clone())
            .with_timeout(self.default_step_timeout)
            .with_cancel(cancel.clone());

        let result = dispatch_tool_call(&self.tools, &call, &ctx)
            .await
            .map_err(|error| match error {
                ToolError::Cancelled => WorkflowError::Cancelled,
                other => WorkflowError::StepFailed {
                    step_id: step.id.clone(),
                    message: other.to_string(),
                },
            })?;

        if !result.success {
            return Err(WorkflowError::StepFailed {
                step_id: step.id.clone(),
                message: result
                    .error
                    .unwrap_or_else(|| "tool reported failure".to_string()),
            });
        }

        serde_json::to_value(&result).map_err(|error| WorkflowError::StepFailed {
            step_id: step.id.clone(),
            message: error.to_string(),
        })
    }

    async fn execute_agent(
        &self,
        step: &WorkflowStep,
        agent_id: &str,
        task: &str,
        state: &WorkflowExecutionState,
    ) -> Result<serde_json::Value, WorkflowError> {
        let agents = self
            .agents
            .as_ref()
            .ok_or_else(|| WorkflowError::StepFailed {
                step_id: step.id.clone(),
                message: "no agent factory configured".to_string(),
            })?;

        let task = interpolate_string(task, &state.scope());
        agents
            .run_agent_task(agent_id, &task)
            .await
            .map_err(|message| WorkflowError::StepFailed {
                step_id: step.id.clone(),
                message,
            })
    }

    /// Settled join: every branch runs to its own end before failures are
    /// aggregated. Branch states are isolated and merged afterwards, so no
    /// ordering is guaranteed between siblings.
    async fn execute_parallel(
        &self,
        steps: &[WorkflowStep],
        state: &mut WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        if steps.is_empty() {
            return Ok(serde_json::json!([]));
        }

        let futures = steps.iter().map(|sub| {
            let mut branch_state = state.clone();
            let cancel = cancel.clone();
            async move {
                let disposition = self.run_step(sub, &mut branch_state, &cancel, None).await;
                (sub.id.clone(), disposition, branch_state)
            }
        });

        let settled = join_all(futures).await;

        let mut failures = Vec::new();
        let mut results = Vec::with_capacity(settled.len());
        for (step_id, disposition, branch_state) in settled {
            // Merge branch bookkeeping back into the parent state.
            state.step_results.extend(branch_state.step_results);
            state.completed_steps.extend(branch_state.completed_steps);
            state.failed_steps.extend(branch_state.failed_steps);
            state.skipped_steps.extend(branch_state.skipped_steps);
            state.variables.extend(branch_state.variables);

            match disposition {
                Ok(_) => results.push(
                    state
                        .step_results
                        .get(&step_id)
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                ),
                Err(WorkflowError::Cancelled) => return Err(WorkflowError::Cancelled),
                Err(error) => {
                    failures.push(format!("{step_id}: {error}"));
                    results.push(serde_json::Value::Null);
                }
            }
        }

        if !failures.is_empty() {
            return Err(WorkflowError::StepFailed {
                step_id: "parallel".to_string(),
                message: failures.join("; "),
            });
        }

        Ok(serde_json::Value::Array(results))
    }

    async fn execute_sequential(
        &self,
        steps: &[WorkflowStep],
        state: &mut WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut results = Vec::with_capacity(steps.len());

        for sub in steps {
            self.run_step(sub, state, cancel, None).await?;
            results.push(
                state
                    .step_results
                    .get(&sub.id)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            );
        }

        Ok(serde_json::Value::Array(results))
    }

    async fn execute_loop(
        &self,
        step: &WorkflowStep,
        items: Option<&serde_json::Value>,
        count: Option<u64>,
        steps: &[WorkflowStep],
        state: &mut WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let iteration_items: Vec<serde_json::Value> = if let Some(items) = items {
            let resolved = interpolate_value(items, &state.scope());
            match resolved {
                serde_json::Value::Array(array) => array,
                other => {
                    return Err(WorkflowError::StepFailed {
                        step_id: step.id.clone(),
                        message: format!("loop items did not resolve to an array: {other}"),
                    })
                }
            }
        } else {
            let count = count.unwrap_or(0);
            (0..count).map(|i| serde_json::json!(i)).collect()
        };

        let total = iteration_items.len();
        // item/index/count are loop-local; shadowed outer variables return
        // after the loop.
        let saved: Vec<(String, Option<serde_json::Value>)> = ["item", "index", "count"]
            .iter()
            .map(|key| (key.to_string(), state.variables.get(*key).cloned()))
            .collect();

        let mut iterations = Vec::with_capacity(total);
        for (index, item) in iteration_items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            state.variables.insert("item".to_string(), item);
            state
                .variables
                .insert("index".to_string(), serde_json::json!(index));
            state
                .variables
                .insert("count".to_string(), serde_json::json!(total));

            let mut iteration_results = Vec::with_capacity(steps.len());
            for sub in steps {
                self.run_step(sub, state, cancel, None).await?;
                iteration_results.push(
                    state
                        .step_results
                        .get(&sub.id)
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                );
            }
            iterations.push(serde_json::Value::Array(iteration_results));
        }

        for (key, previous) in saved {
            match previous {
                Some(value) => {
                    state.variables.insert(key, value);
                }
                None => {
                    state.variables.remove(&key);
                }
            }
        }

        Ok(serde_json::Value::Array(iterations))
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_wait(
        &self,
        step: &WorkflowStep,
        duration_ms: Option<u64>,
        condition: Option<&str>,
        check_interval_ms: Option<u64>,
        max_wait_ms: Option<u64>,
        state: &WorkflowExecutionState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        if let Some(duration_ms) = duration_ms {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => {
                    return Ok(serde_json::json!({ "waited_ms": duration_ms }));
                }
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            }
        }

        let Some(expression) = condition else {
            return Ok(serde_json::json!({ "waited_ms": 0 }));
        };

        let interval = Duration::from_millis(check_interval_ms.unwrap_or(100));
        let max_wait = Duration::from_millis(max_wait_ms.unwrap_or(30_000));
        let started = std::time::Instant::now();

        loop {
            if evaluate_condition(expression, &state.scope())? {
                return Ok(serde_json::json!({
                    "waited_ms": started.elapsed().as_millis() as u64
                }));
            }
            if started.elapsed() >= max_wait {
                return Err(WorkflowError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms: max_wait.as_millis() as u64,
                });
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            }
        }
    }

    /// Copy values out of a step result into the execution variables, making
    /// them visible to subsequent steps.
    fn apply_outputs(
        &self,
        step: &WorkflowStep,
        result: &serde_json::Value,
        state: &mut WorkflowExecutionState,
    ) {
        for (variable, path) in &step.outputs {
            let value = if path.is_empty() {
                Some(result)
            } else {
                lookup_path(result, path)
            };
            match value {
                Some(value) => {
                    state.variables.insert(variable.clone(), value.clone());
                }
                None => {
                    log::warn!(
                        "step '{}': output path '{path}' not found in result",
                        step.id
                    );
                }
            }
        }
    }
}

fn emit(bus: Option<&EventBus>, event: WorkflowEvent) {
    if let Some(bus) = bus {
        bus.emit(&event);
    }
}
