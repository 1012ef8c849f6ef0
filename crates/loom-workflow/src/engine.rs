//! Workflow lifecycle: start/pause/resume/cancel, progress, cleanup.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::events::{EventBus, WorkflowEvent};
use crate::executor::WorkflowExecutor;
use crate::types::{Workflow, WorkflowExecutionState, WorkflowStatus};
use crate::validation::{topological_order, validate_workflow};

#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    pub max_concurrent_workflows: usize,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub execution_id: Option<String>,
    pub initial_variables: serde_json::Map<String, serde_json::Value>,
    pub skip_validation: bool,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct WorkflowProgress {
    pub percent: f64,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub estimated_remaining_ms: Option<u64>,
}

struct ExecutionEntry {
    snapshot: Arc<Mutex<WorkflowExecutionState>>,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
}

/// Owns every execution it creates; the spawned execution task is the only
/// mutator of the authoritative state, and the engine serves snapshots.
pub struct WorkflowEngine {
    executor: Arc<WorkflowExecutor>,
    executions: Arc<DashMap<String, ExecutionEntry>>,
    events: Arc<EventBus>,
    config: WorkflowEngineConfig,
}

impl WorkflowEngine {
    pub fn new(executor: Arc<WorkflowExecutor>, config: WorkflowEngineConfig) -> Self {
        Self {
            executor,
            executions: Arc::new(DashMap::new()),
            events: Arc::new(EventBus::new()),
            config,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn running_count(&self) -> usize {
        self.executions
            .iter()
            .filter(|entry| {
                let state = entry.snapshot.lock().expect("snapshot lock poisoned");
                matches!(state.status, WorkflowStatus::Running | WorkflowStatus::Pending)
            })
            .count()
    }

    /// Validate, register and asynchronously run a workflow. Returns the
    /// execution id immediately.
    pub fn start(&self, workflow: Workflow, options: StartOptions) -> Result<String, WorkflowError> {
        if !options.skip_validation {
            validate_workflow(&workflow)?;
            check_tool_references(&workflow.steps, self.executor.as_ref())?;
        }

        if self.running_count() >= self.config.max_concurrent_workflows {
            return Err(WorkflowError::ConcurrencyLimit(
                self.config.max_concurrent_workflows,
            ));
        }

        let execution_id = options
            .execution_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.executions.contains_key(&execution_id) {
            return Err(WorkflowError::Validation(format!(
                "execution id '{execution_id}' already exists"
            )));
        }

        if let Some(metadata) = &options.metadata {
            log::debug!("starting '{execution_id}' with metadata: {metadata}");
        }

        let state =
            WorkflowExecutionState::new(execution_id.clone(), workflow, options.initial_variables);
        let snapshot = Arc::new(Mutex::new(state.clone()));
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        self.executions.insert(
            execution_id.clone(),
            ExecutionEntry {
                snapshot: Arc::clone(&snapshot),
                cancel: cancel.clone(),
                pause_tx,
            },
        );

        let executor = Arc::clone(&self.executor);
        let events = Arc::clone(&self.events);
        tokio::spawn(run_execution(state, executor, events, snapshot, cancel, pause_rx));

        Ok(execution_id)
    }

    pub fn pause(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let entry = self
            .executions
            .get(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(execution_id.to_string()))?;

        {
            let mut state = entry.snapshot.lock().expect("snapshot lock poisoned");
            if state.status != WorkflowStatus::Running {
                return Err(WorkflowError::InvalidState(format!(
                    "cannot pause execution in state {:?}",
                    state.status
                )));
            }
            state.status = WorkflowStatus::Paused;
        }

        let _ = entry.pause_tx.send(true);
        self.events.emit(&WorkflowEvent::WorkflowPaused {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    /// Resume a paused execution; the loop continues from the next
    /// not-yet-completed step in order.
    pub fn resume(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let entry = self
            .executions
            .get(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(execution_id.to_string()))?;

        {
            let mut state = entry.snapshot.lock().expect("snapshot lock poisoned");
            if state.status != WorkflowStatus::Paused {
                return Err(WorkflowError::InvalidState(format!(
                    "cannot resume execution in state {:?}",
                    state.status
                )));
            }
            state.status = WorkflowStatus::Running;
        }

        let _ = entry.pause_tx.send(false);
        self.events.emit(&WorkflowEvent::WorkflowResumed {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    /// Signal cancellation. The execution task observes the handle at its
    /// next suspension point and emits exactly one cancelled event.
    pub fn cancel(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let entry = self
            .executions
            .get(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(execution_id.to_string()))?;

        {
            let state = entry.snapshot.lock().expect("snapshot lock poisoned");
            if state.status.is_terminal() {
                return Err(WorkflowError::InvalidState(format!(
                    "cannot cancel execution in state {:?}",
                    state.status
                )));
            }
        }

        entry.cancel.cancel();
        // A paused task is parked on the pause gate; wake it so it can
        // observe the cancellation.
        let _ = entry.pause_tx.send(false);
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<WorkflowExecutionState> {
        self.executions.get(execution_id).map(|entry| {
            entry
                .snapshot
                .lock()
                .expect("snapshot lock poisoned")
                .clone()
        })
    }

    pub fn list_executions(&self) -> Vec<WorkflowExecutionState> {
        self.executions
            .iter()
            .map(|entry| {
                entry
                    .snapshot
                    .lock()
                    .expect("snapshot lock poisoned")
                    .clone()
            })
            .collect()
    }

    pub fn progress(&self, execution_id: &str) -> Result<WorkflowProgress, WorkflowError> {
        let state = self
            .get_execution(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(execution_id.to_string()))?;

        let total = state.workflow.steps.len();
        let done = state
            .workflow
            .steps
            .iter()
            .filter(|step| {
                state.completed_steps.contains(&step.id) || state.skipped_steps.contains(&step.id)
            })
            .count();

        let percent = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };

        let estimated_remaining_ms = if done > 0 && done < total {
            let elapsed = (Utc::now() - state.started_at).num_milliseconds().max(0) as u64;
            Some(elapsed / done as u64 * (total - done) as u64)
        } else {
            None
        };

        Ok(WorkflowProgress {
            percent,
            completed_steps: done,
            total_steps: total,
            estimated_remaining_ms,
        })
    }

    /// Evict terminal executions whose completion is older than the cutoff.
    pub fn cleanup_executions(&self, older_than_ms: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(older_than_ms as i64);
        let stale: Vec<String> = self
            .executions
            .iter()
            .filter(|entry| {
                let state = entry.snapshot.lock().expect("snapshot lock poisoned");
                state.status.is_terminal()
                    && state.completed_at.map_or(false, |at| at < cutoff)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in &stale {
            self.executions.remove(key);
        }
        stale.len()
    }
}

/// The execution task: drives steps in dependency order, synchronising its
/// authoritative state into the shared snapshot after every step.
async fn run_execution(
    mut state: WorkflowExecutionState,
    executor: Arc<WorkflowExecutor>,
    events: Arc<EventBus>,
    snapshot: Arc<Mutex<WorkflowExecutionState>>,
    cancel: CancellationToken,
    mut pause_rx: watch::Receiver<bool>,
) {
    state.status = WorkflowStatus::Running;
    sync(&snapshot, &state, &pause_rx);
    events.emit(&WorkflowEvent::WorkflowStarted {
        execution_id: state.execution_id.clone(),
        workflow_id: state.workflow.id.clone(),
    });

    let workflow = state.workflow.clone();
    let order = match topological_order(&workflow.steps) {
        Ok(order) => order,
        Err(error) => {
            finish(&mut state, WorkflowStatus::Failed, Some(error.to_string()));
            sync(&snapshot, &state, &pause_rx);
            events.emit(&WorkflowEvent::WorkflowFailed {
                execution_id: state.execution_id.clone(),
                error: error.to_string(),
            });
            return;
        }
    };

    let total_steps = order.len();
    for step in order {
        // Pause gate; cancellation wakes it too.
        while *pause_rx.borrow() {
            tokio::select! {
                _ = pause_rx.changed() => {}
                _ = cancel.cancelled() => break,
            }
        }

        if cancel.is_cancelled() {
            finish(&mut state, WorkflowStatus::Cancelled, None);
            sync(&snapshot, &state, &pause_rx);
            events.emit(&WorkflowEvent::WorkflowCancelled {
                execution_id: state.execution_id.clone(),
            });
            return;
        }

        if state.completed_steps.contains(&step.id) {
            continue;
        }

        // A step only runs once every dependency completed; otherwise it is
        // skipped (a failed dependency with continue_on_error lands here).
        let deps_completed = step
            .depends_on
            .iter()
            .all(|dep| state.completed_steps.contains(dep));
        if !deps_completed {
            state.skipped_steps.insert(step.id.clone());
            events.emit(&WorkflowEvent::StepSkipped {
                execution_id: state.execution_id.clone(),
                step_id: step.id.clone(),
            });
            sync(&snapshot, &state, &pause_rx);
            continue;
        }

        match executor.run_step(step, &mut state, &cancel, Some(&events)).await {
            Ok(_) => {
                sync(&snapshot, &state, &pause_rx);
                let done = state.completed_steps.len() + state.skipped_steps.len();
                let percent = if total_steps == 0 {
                    100.0
                } else {
                    (done.min(total_steps)) as f64 / total_steps as f64 * 100.0
                };
                events.emit(&WorkflowEvent::ProgressUpdated {
                    execution_id: state.execution_id.clone(),
                    percent,
                });
            }
            Err(error) if error.is_cancellation() => {
                finish(&mut state, WorkflowStatus::Cancelled, None);
                sync(&snapshot, &state, &pause_rx);
                events.emit(&WorkflowEvent::WorkflowCancelled {
                    execution_id: state.execution_id.clone(),
                });
                return;
            }
            Err(error) => {
                finish(&mut state, WorkflowStatus::Failed, Some(error.to_string()));
                sync(&snapshot, &state, &pause_rx);
                events.emit(&WorkflowEvent::WorkflowFailed {
                    execution_id: state.execution_id.clone(),
                    error: error.to_string(),
                });
                return;
            }
        }
    }

    finish(&mut state, WorkflowStatus::Completed, None);
    sync(&snapshot, &state, &pause_rx);
    events.emit(&WorkflowEvent::WorkflowCompleted {
        execution_id: state.execution_id.clone(),
    });
}

fn check_tool_references(
    steps: &[crate::types::WorkflowStep],
    executor: &WorkflowExecutor,
) -> Result<(), WorkflowError> {
    for step in steps {
        if let crate::types::StepKind::Tool { tool, .. } = &step.kind {
            if !executor.has_tool(tool) {
                return Err(WorkflowError::Validation(format!(
                    "step '{}' references unknown tool '{tool}'",
                    step.id
                )));
            }
        }
        check_tool_references(step.kind.sub_steps(), executor)?;
    }
    Ok(())
}

fn finish(state: &mut WorkflowExecutionState, status: WorkflowStatus, error: Option<String>) {
    state.status = status;
    state.completed_at = Some(Utc::now());
    state.error = error;
}

fn sync(
    snapshot: &Arc<Mutex<WorkflowExecutionState>>,
    state: &WorkflowExecutionState,
    pause_rx: &watch::Receiver<bool>,
) {
    let mut guard = snapshot.lock().expect("snapshot lock poisoned");
    let mut copy = state.clone();
    // While the pause flag is set the user-visible status stays Paused even
    // though the loop's own status is still Running mid-step.
    if *pause_rx.borrow() && copy.status == WorkflowStatus::Running {
        copy.status = WorkflowStatus::Paused;
    }
    *guard = copy;
}
