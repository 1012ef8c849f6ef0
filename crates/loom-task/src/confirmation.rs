//! Correlates proposed action batches with user decisions.

use dashmap::DashMap;
use uuid::Uuid;

use loom_core::Todo;

use crate::planner::ProposedAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResponse {
    Approved,
    /// Replacement user input; the task restarts from scratch with it.
    Modified(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub id: String,
    pub todo: Todo,
    pub actions: Vec<ProposedAction>,
}

/// What the caller should do after a user decision.
#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Execute {
        todo: Todo,
        actions: Vec<ProposedAction>,
    },
    Restart {
        new_request: String,
    },
    Dropped,
}

#[derive(Default)]
pub struct ConfirmationBridge {
    pending: DashMap<String, PendingConfirmation>,
}

impl ConfirmationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a proposed batch and hand back the id shown to the user.
    pub fn register(&self, todo: Todo, actions: Vec<ProposedAction>) -> String {
        let id = Uuid::new_v4().to_string();
        self.pending.insert(
            id.clone(),
            PendingConfirmation {
                id: id.clone(),
                todo,
                actions,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<PendingConfirmation> {
        self.pending.get(id).map(|entry| entry.value().clone())
    }

    /// Resolve a pending confirmation. Returns `None` for unknown ids (e.g.
    /// a stale response after restart).
    pub fn resolve(&self, id: &str, response: ConfirmationResponse) -> Option<ConfirmationOutcome> {
        let (_, pending) = self.pending.remove(id)?;

        Some(match response {
            ConfirmationResponse::Approved => ConfirmationOutcome::Execute {
                todo: pending.todo,
                actions: pending.actions,
            },
            ConfirmationResponse::Modified(new_request) => {
                ConfirmationOutcome::Restart { new_request }
            }
            ConfirmationResponse::Cancelled => ConfirmationOutcome::Dropped,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_batch(bridge: &ConfirmationBridge) -> String {
        bridge.register(
            Todo::new("Read hello.txt", "Reading"),
            vec![ProposedAction::mapped(
                "read it",
                "file_read",
                json!({"path": "hello.txt"}),
            )],
        )
    }

    #[test]
    fn approved_resolves_to_execute() {
        let bridge = ConfirmationBridge::new();
        let id = pending_batch(&bridge);

        let outcome = bridge.resolve(&id, ConfirmationResponse::Approved).unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Execute { actions, .. } if actions.len() == 1));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn modified_resolves_to_restart_with_new_input() {
        let bridge = ConfirmationBridge::new();
        let id = pending_batch(&bridge);

        let outcome = bridge
            .resolve(&id, ConfirmationResponse::Modified("read other.txt".to_string()))
            .unwrap();
        assert!(
            matches!(outcome, ConfirmationOutcome::Restart { new_request } if new_request == "read other.txt")
        );
    }

    #[test]
    fn cancelled_drops_the_batch() {
        let bridge = ConfirmationBridge::new();
        let id = pending_batch(&bridge);

        let outcome = bridge.resolve(&id, ConfirmationResponse::Cancelled).unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Dropped));
    }

    #[test]
    fn unknown_and_replayed_ids_return_none() {
        let bridge = ConfirmationBridge::new();
        let id = pending_batch(&bridge);

        assert!(bridge.resolve("nope", ConfirmationResponse::Approved).is_none());
        bridge.resolve(&id, ConfirmationResponse::Approved).unwrap();
        assert!(bridge.resolve(&id, ConfirmationResponse::Approved).is_none());
    }
}
