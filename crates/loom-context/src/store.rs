//! Append-only message log with token accounting and bounded-budget pruning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use loom_core::{
    HeuristicTokenCounter, Message, MessagePriority, Role, SharedTokenCounter,
};
use loom_llm::{ChatRequest, EmbeddingProvider, SharedChatClient};

use crate::error::ContextError;
use crate::export::{ContextSnapshot, SnapshotState, SnapshotStats, EXPORT_VERSION};
use crate::strategy::{
    cosine_similarity, priority_score, PruneReport, PruningStrategy, SemanticConfig,
    SlidingWindowConfig, SummaryConfig,
};

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_tokens: u32,
    pub auto_prune: bool,
    pub strategy: PruningStrategy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            auto_prune: true,
            strategy: PruningStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub role: Option<Role>,
    pub min_priority: Option<MessagePriority>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub message: Message,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ContextStats {
    pub message_count: usize,
    pub total_tokens: u32,
    pub max_tokens: u32,
    pub prune_count: u64,
    pub last_pruned_at: Option<DateTime<Utc>>,
}

/// Owns all messages of one conversation. The system message lives in a
/// dedicated slot and precedes the insertion-ordered tail in every LLM view.
pub struct ContextStore {
    system_message: Option<Message>,
    messages: Vec<Message>,
    total_tokens: u32,
    config: ContextConfig,
    counter: SharedTokenCounter,
    summarizer: Option<SharedChatClient>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    summaries: Vec<String>,
    prune_count: u64,
    last_pruned_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl ContextStore {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            system_message: None,
            messages: Vec::new(),
            total_tokens: 0,
            config,
            counter: Arc::new(HeuristicTokenCounter::default()),
            summarizer: None,
            embedder: None,
            summaries: Vec::new(),
            prune_count: 0,
            last_pruned_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_counter(mut self, counter: SharedTokenCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_summarizer(mut self, summarizer: SharedChatClient) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Append a message. System-role messages replace the dedicated slot;
    /// everything else joins the ordered tail. Fires the auto-prune hook when
    /// the add pushes the store over budget.
    pub async fn add_message(&mut self, mut message: Message) -> Result<String, ContextError> {
        message.tokens = self.counter.count_message(&message);
        let id = message.id.clone();

        if message.role == Role::System {
            let old_tokens = self.system_message.as_ref().map_or(0, |m| m.tokens);
            let new_tokens = message.tokens;
            self.system_message = Some(message);
            self.total_tokens = self
                .total_tokens
                .saturating_sub(old_tokens)
                .saturating_add(new_tokens);
        } else {
            self.total_tokens = self.total_tokens.saturating_add(message.tokens);
            self.messages.push(message);
        }
        self.touch();

        if self.config.auto_prune && self.needs_pruning() {
            // A single pass can fall short when the summary itself is large;
            // bail out as soon as a pass stops making progress.
            for _ in 0..3 {
                let report = self.prune().await?;
                if !self.needs_pruning() || report.removed_count == 0 {
                    break;
                }
            }
        }

        Ok(id)
    }

    /// Exactly the sequence the LLM sees: system first, then insertion order.
    pub fn messages_for_llm(&self) -> Vec<Message> {
        let mut view = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_message {
            view.push(system.clone());
        }
        view.extend(self.messages.iter().cloned());
        view
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        if let Some(system) = &self.system_message {
            if system.id == id {
                return Some(system);
            }
        }
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        if self.system_message.as_ref().map_or(false, |m| m.id == id) {
            let removed = self.system_message.take();
            if let Some(removed) = &removed {
                self.total_tokens = self.total_tokens.saturating_sub(removed.tokens);
            }
            self.touch();
            return removed;
        }

        let index = self.messages.iter().position(|m| m.id == id)?;
        let removed = self.messages.remove(index);
        self.total_tokens = self.total_tokens.saturating_sub(removed.tokens);
        self.touch();
        Some(removed)
    }

    pub fn get_messages(&self, filter: &MessageFilter) -> Vec<Message> {
        self.messages_for_llm()
            .into_iter()
            .filter(|message| {
                filter.role.map_or(true, |role| message.role == role)
                    && filter
                        .min_priority
                        .map_or(true, |min| message.priority >= min)
            })
            .collect()
    }

    /// Replace the system slot. Token accounting is adjusted in the same
    /// operation, so `total_tokens` is never observed mid-swap.
    pub fn set_system_message(&mut self, content: impl Into<String>) -> String {
        let mut message = Message::system(content);
        message.tokens = self.counter.count_message(&message);
        let id = message.id.clone();

        let old_tokens = self.system_message.as_ref().map_or(0, |m| m.tokens);
        let new_tokens = message.tokens;
        self.system_message = Some(message);
        self.total_tokens = self
            .total_tokens
            .saturating_sub(old_tokens)
            .saturating_add(new_tokens);
        self.touch();
        id
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.system_message.as_ref()
    }

    pub fn needs_pruning(&self) -> bool {
        self.total_tokens > self.config.max_tokens
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    pub fn message_count(&self) -> usize {
        self.messages.len() + usize::from(self.system_message.is_some())
    }

    pub fn get_stats(&self) -> ContextStats {
        ContextStats {
            message_count: self.message_count(),
            total_tokens: self.total_tokens,
            max_tokens: self.config.max_tokens,
            prune_count: self.prune_count,
            last_pruned_at: self.last_pruned_at,
        }
    }

    /// Run the configured strategy once and report what was dropped.
    pub async fn prune(&mut self) -> Result<PruneReport, ContextError> {
        let strategy = self.config.strategy.clone();
        let mut metadata = json!({});

        let mut removed = match &strategy {
            PruningStrategy::SlidingWindow(config) => self.prune_sliding(config),
            PruningStrategy::PriorityBased(_) => self.prune_priority(),
            PruningStrategy::SummaryBased(config) => {
                self.prune_summary(config, &mut metadata).await?
            }
            PruningStrategy::Semantic(config) => {
                self.prune_semantic(config, &mut metadata).await?
            }
        };

        // The system slot is only ever given up explicitly, and only when the
        // strategy does not preserve it.
        if !strategy.preserve_system_message()
            && self.needs_pruning()
            && self.messages.len() <= 1
        {
            if let Some(system) = self.system_message.take() {
                self.total_tokens = self.total_tokens.saturating_sub(system.tokens);
                metadata["system_dropped"] = json!(true);
                removed.push(system);
            }
        }

        let removed_tokens = removed.iter().map(|m| m.tokens).fold(0u32, u32::saturating_add);
        self.prune_count += 1;
        self.last_pruned_at = Some(Utc::now());
        self.touch();

        log::debug!(
            "pruned {} messages ({} tokens) via {}, {} tokens retained",
            removed.len(),
            removed_tokens,
            strategy.tag(),
            self.total_tokens
        );

        Ok(PruneReport {
            kept: self.messages_for_llm(),
            removed_count: removed.len(),
            removed_tokens,
            strategy: strategy.tag(),
            metadata,
        })
    }

    fn prune_sliding(&mut self, config: &SlidingWindowConfig) -> Vec<Message> {
        let mut removed = Vec::new();

        while self.messages.len() > config.max_messages.max(1) {
            removed.push(self.remove_oldest());
        }

        while self.total_tokens > self.config.max_tokens && self.messages.len() > 1 {
            removed.push(self.remove_oldest());
        }

        removed
    }

    fn prune_priority(&mut self) -> Vec<Message> {
        let mut removed = Vec::new();

        while self.total_tokens > self.config.max_tokens && !self.messages.is_empty() {
            let total = self.messages.len();
            let lowest = self
                .messages
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    priority_score(a, *ia, total)
                        .partial_cmp(&priority_score(b, *ib, total))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(index, _)| index);

            match lowest {
                Some(index) => {
                    let message = self.messages.remove(index);
                    self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
                    removed.push(message);
                }
                None => break,
            }
        }

        removed
    }

    async fn prune_summary(
        &mut self,
        config: &SummaryConfig,
        metadata: &mut serde_json::Value,
    ) -> Result<Vec<Message>, ContextError> {
        let summarizer = self.summarizer.clone().ok_or(ContextError::MissingSummarizer)?;

        if self.messages.len() <= 1 {
            return Ok(Vec::new());
        }

        let evict_count = config.window.clamp(1, self.messages.len() - 1);
        let evicted: Vec<Message> = self.messages.drain(0..evict_count).collect();
        for message in &evicted {
            self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
        }

        let transcript = evicted
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = ChatRequest::new(vec![
            Message::system(
                "Summarize the following conversation segment. Keep decisions, facts and open items. Be concise.",
            ),
            Message::user(transcript),
        ])
        .with_temperature(0.2);

        let mut summary_inserted = false;
        match summarizer.chat(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let mut summary = Message::assistant(
                    format!("[Conversation summary] {}", response.content.trim()),
                    None,
                )
                .with_priority(MessagePriority::High);
                summary.tokens = self.counter.count_message(&summary);

                self.total_tokens = self.total_tokens.saturating_add(summary.tokens);
                self.summaries.push(summary.content.clone());
                self.messages.insert(0, summary);
                summary_inserted = true;
            }
            Ok(_) => {
                log::warn!("summarizer returned empty content, pruning without summary");
            }
            Err(error) => {
                log::warn!("summarizer failed ({error}), pruning without summary");
            }
        }

        metadata["summarized_messages"] = json!(evict_count);
        metadata["summary_inserted"] = json!(summary_inserted);

        // The summary itself may not be enough to get back under budget.
        let skip = usize::from(summary_inserted);
        let mut removed = evicted;
        while self.total_tokens > self.config.max_tokens && self.messages.len() > skip + 1 {
            let message = self.messages.remove(skip);
            self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
            removed.push(message);
        }

        Ok(removed)
    }

    async fn prune_semantic(
        &mut self,
        config: &SemanticConfig,
        metadata: &mut serde_json::Value,
    ) -> Result<Vec<Message>, ContextError> {
        let embedder = self.embedder.clone().ok_or(ContextError::MissingEmbedder)?;

        if self.messages.len() <= 1 {
            return Ok(Vec::new());
        }

        let recent_start = self.messages.len().saturating_sub(config.recent_window.max(1));
        let recent_content = self.messages[recent_start..]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut scored: Vec<(String, f32)> = Vec::new();
        match embedder.embed(&recent_content).await {
            Ok(anchor) => {
                for message in &self.messages[..recent_start] {
                    match embedder.embed(&message.content).await {
                        Ok(vector) => {
                            scored.push((message.id.clone(), cosine_similarity(&vector, &anchor)));
                        }
                        Err(error) => {
                            log::warn!("embedding failed for message ({error}), scoring as 0");
                            scored.push((message.id.clone(), 0.0));
                        }
                    }
                }
            }
            Err(error) => {
                log::warn!("anchor embedding failed ({error}), falling back to oldest-first");
                metadata["embedding_failed"] = json!(true);
                scored = self.messages[..recent_start]
                    .iter()
                    .enumerate()
                    .map(|(index, m)| (m.id.clone(), index as f32))
                    .collect();
            }
        }

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut removed = Vec::new();
        for (id, similarity) in scored {
            if self.total_tokens <= self.config.max_tokens || self.messages.len() <= 1 {
                break;
            }
            if let Some(index) = self.messages.iter().position(|m| m.id == id) {
                let message = self.messages.remove(index);
                self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
                log::debug!("evicting message with similarity {similarity:.3}");
                removed.push(message);
            }
        }

        metadata["min_similarity"] = json!(config.min_similarity);
        Ok(removed)
    }

    fn remove_oldest(&mut self) -> Message {
        let message = self.messages.remove(0);
        self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
        message
    }

    /// Keyword search: score = matched query terms / total query terms.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<SearchResult> = self
            .messages_for_llm()
            .into_iter()
            .filter_map(|message| {
                let content = message.content.to_lowercase();
                let matched = terms.iter().filter(|term| content.contains(*term)).count();
                let score = matched as f64 / terms.len() as f64;
                (score > 0.0 && score >= options.threshold)
                    .then_some(SearchResult { message, score })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);
        results
    }

    pub fn export(&self) -> ContextSnapshot {
        ContextSnapshot {
            version: EXPORT_VERSION.to_string(),
            timestamp: self.updated_at,
            state: SnapshotState {
                messages: self.messages.clone(),
                total_tokens: self.total_tokens,
                max_tokens: self.config.max_tokens,
                system_message: self.system_message.clone(),
            },
            summaries: self.summaries.clone(),
            stats: SnapshotStats {
                prune_count: self.prune_count,
                last_pruned_at: self.last_pruned_at,
            },
        }
    }

    /// Restore a store from a snapshot. Fails when the snapshot was produced
    /// by a different major version.
    pub fn import(snapshot: ContextSnapshot) -> Result<Self, ContextError> {
        let expected = major_version(EXPORT_VERSION).unwrap_or(1);
        match major_version(&snapshot.version) {
            Some(found) if found == expected => {}
            _ => {
                return Err(ContextError::IncompatibleVersion {
                    expected,
                    found: snapshot.version,
                })
            }
        }

        let mut store = Self::new(ContextConfig {
            max_tokens: snapshot.state.max_tokens,
            ..ContextConfig::default()
        });
        store.messages = snapshot.state.messages;
        store.system_message = snapshot.state.system_message;
        store.total_tokens = snapshot.state.total_tokens;
        store.summaries = snapshot.summaries;
        store.prune_count = snapshot.stats.prune_count;
        store.last_pruned_at = snapshot.stats.last_pruned_at;
        store.updated_at = snapshot.timestamp;
        Ok(store)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}
