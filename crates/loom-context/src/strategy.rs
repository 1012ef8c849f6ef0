//! Pruning strategies for the bounded context store.
//!
//! Strategies are plain config variants; the collaborators some of them need
//! (a chat client for summaries, an embedding provider for semantic scoring)
//! are injected into the store, not stored here.

use serde::{Deserialize, Serialize};

use loom_core::{Message, MessagePriority, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PruningStrategy {
    SlidingWindow(SlidingWindowConfig),
    PriorityBased(PriorityConfig),
    SummaryBased(SummaryConfig),
    Semantic(SemanticConfig),
}

impl Default for PruningStrategy {
    fn default() -> Self {
        PruningStrategy::SlidingWindow(SlidingWindowConfig::default())
    }
}

impl PruningStrategy {
    pub fn tag(&self) -> &'static str {
        match self {
            PruningStrategy::SlidingWindow(_) => "sliding_window",
            PruningStrategy::PriorityBased(_) => "priority_based",
            PruningStrategy::SummaryBased(_) => "summary_based",
            PruningStrategy::Semantic(_) => "semantic",
        }
    }

    pub fn preserve_system_message(&self) -> bool {
        match self {
            PruningStrategy::SlidingWindow(config) => config.preserve_system_message,
            PruningStrategy::PriorityBased(config) => config.preserve_system_message,
            PruningStrategy::SummaryBased(config) => config.preserve_system_message,
            PruningStrategy::Semantic(config) => config.preserve_system_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Upper bound on retained non-system messages.
    pub max_messages: usize,
    #[serde(default = "default_true")]
    pub preserve_system_message: bool,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            preserve_system_message: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    #[serde(default = "default_true")]
    pub preserve_system_message: bool,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            preserve_system_message: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Number of oldest messages folded into each synthesised summary.
    pub window: usize,
    #[serde(default = "default_true")]
    pub preserve_system_message: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            window: 10,
            preserve_system_message: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Messages scoring below this similarity are preferred for eviction.
    pub min_similarity: f32,
    /// Number of most recent messages whose content anchors the comparison.
    pub recent_window: usize,
    #[serde(default = "default_true")]
    pub preserve_system_message: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.3,
            recent_window: 5,
            preserve_system_message: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Outcome of a `prune()` call.
#[derive(Debug, Clone)]
pub struct PruneReport {
    pub kept: Vec<Message>,
    pub removed_count: usize,
    pub removed_tokens: u32,
    pub strategy: &'static str,
    pub metadata: serde_json::Value,
}

/// Eviction score for the priority strategy: priority tier dominates, then
/// recency, then role (tool output is cheapest to lose).
pub(crate) fn priority_score(message: &Message, index: usize, total: usize) -> f64 {
    let priority_weight = match message.priority {
        MessagePriority::Low => 0.0,
        MessagePriority::Normal => 1.0,
        MessagePriority::High => 2.0,
        MessagePriority::Critical => 3.0,
    };

    let recency = if total <= 1 {
        1.0
    } else {
        index as f64 / (total - 1) as f64
    };

    let role_weight = match message.role {
        Role::System => 1.0,
        Role::User => 0.6,
        Role::Assistant => 0.4,
        Role::Tool => 0.2,
    };

    priority_weight * 10.0 + recency * 5.0 + role_weight
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
