//! Workflow event bus: typed listener buckets plus a wildcard bucket.
//! Delivery is synchronous on the emitter's task; listener panics are
//! isolated and logged.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
    },
    WorkflowCompleted {
        execution_id: String,
    },
    WorkflowFailed {
        execution_id: String,
        error: String,
    },
    WorkflowPaused {
        execution_id: String,
    },
    WorkflowResumed {
        execution_id: String,
    },
    WorkflowCancelled {
        execution_id: String,
    },
    StepStarted {
        execution_id: String,
        step_id: String,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
    },
    StepFailed {
        execution_id: String,
        step_id: String,
        error: String,
    },
    StepSkipped {
        execution_id: String,
        step_id: String,
    },
    ProgressUpdated {
        execution_id: String,
        percent: f64,
    },
}

impl WorkflowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow:started",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow:completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow:failed",
            WorkflowEvent::WorkflowPaused { .. } => "workflow:paused",
            WorkflowEvent::WorkflowResumed { .. } => "workflow:resumed",
            WorkflowEvent::WorkflowCancelled { .. } => "workflow:cancelled",
            WorkflowEvent::StepStarted { .. } => "step:started",
            WorkflowEvent::StepCompleted { .. } => "step:completed",
            WorkflowEvent::StepFailed { .. } => "step:failed",
            WorkflowEvent::StepSkipped { .. } => "step:skipped",
            WorkflowEvent::ProgressUpdated { .. } => "progress:updated",
        }
    }
}

pub type Listener = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    typed: Mutex<HashMap<String, Vec<Listener>>>,
    wildcard: Mutex<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: &str, listener: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.typed
            .lock()
            .expect("listener lock poisoned")
            .entry(kind.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn subscribe_all<F>(&self, listener: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.wildcard
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(listener));
    }

    pub fn emit(&self, event: &WorkflowEvent) {
        let typed: Vec<Listener> = self
            .typed
            .lock()
            .expect("listener lock poisoned")
            .get(event.kind())
            .cloned()
            .unwrap_or_default();
        let wildcard: Vec<Listener> = self
            .wildcard
            .lock()
            .expect("listener lock poisoned")
            .clone();

        for listener in typed.iter().chain(wildcard.iter()) {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::warn!("workflow event listener panicked on {}", event.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started() -> WorkflowEvent {
        WorkflowEvent::WorkflowStarted {
            execution_id: "exec".to_string(),
            workflow_id: "wf".to_string(),
        }
    }

    #[test]
    fn typed_listener_receives_only_its_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        bus.subscribe("workflow:started", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&started());
        bus.emit(&WorkflowEvent::WorkflowCompleted {
            execution_id: "exec".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_listener_receives_everything() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        bus.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&started());
        bus.emit(&WorkflowEvent::StepSkipped {
            execution_id: "exec".to_string(),
            step_id: "s".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_panics_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        bus.subscribe_all(|_| panic!("bad listener"));
        bus.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&started());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
