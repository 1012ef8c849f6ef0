//! Versioned snapshot format for persisting a context store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loom_core::Message;

/// Bumping the major segment invalidates older snapshots on import.
pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub state: SnapshotState,
    #[serde(default)]
    pub summaries: Vec<String>,
    pub stats: SnapshotStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotState {
    pub messages: Vec<Message>,
    pub total_tokens: u32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<Message>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub prune_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pruned_at: Option<DateTime<Utc>>,
}
