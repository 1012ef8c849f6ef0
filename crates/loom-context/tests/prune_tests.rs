use std::sync::Arc;

use async_trait::async_trait;

use loom_context::{
    ContextConfig, ContextStore, PriorityConfig, PruningStrategy, SemanticConfig,
    SlidingWindowConfig, SummaryConfig,
};
use loom_core::{Message, MessagePriority, Role};
use loom_llm::{ChatClient, ChatRequest, ChatResponse, EmbeddingProvider, LlmError, ResponseMessage};

struct FixedSummarizer;

#[async_trait]
impl ChatClient for FixedSummarizer {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let content = "earlier conversation covered greetings".to_string();
        Ok(ChatResponse {
            content: content.clone(),
            message: ResponseMessage {
                content,
                tool_calls: None,
            },
            usage: None,
        })
    }
}

struct FailingSummarizer;

#[async_trait]
impl ChatClient for FailingSummarizer {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Api("unreachable".to_string()))
    }
}

/// Embeds text as a 2d vector keyed off a topic marker, so similarity is
/// deterministic: "cats" content aligns with "cats" anchors.
struct TopicEmbedder;

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.contains("cats") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

fn message_of_tokens(content_prefix: &str, tokens: usize) -> Message {
    // Heuristic counter yields ⌈chars/4⌉, so 4×tokens chars => exact count.
    let mut content = String::from(content_prefix);
    while content.len() < tokens * 4 {
        content.push('x');
    }
    content.truncate(tokens * 4);
    Message::user(content)
}

fn store(max_tokens: u32, strategy: PruningStrategy) -> ContextStore {
    ContextStore::new(ContextConfig {
        max_tokens,
        auto_prune: true,
        strategy,
    })
}

#[tokio::test]
async fn sliding_window_keeps_recent_messages_and_system() {
    // System + 5 pairs of 100-token messages against a 400-token budget.
    let mut store = store(
        400,
        PruningStrategy::SlidingWindow(SlidingWindowConfig {
            max_messages: 3,
            preserve_system_message: true,
        }),
    );

    store.add_message(Message::system("sys")).await.unwrap();
    let system_tokens = store.total_tokens();

    for pair in 0..5 {
        store
            .add_message(message_of_tokens(&format!("u{pair} "), 100))
            .await
            .unwrap();
        store
            .add_message(message_of_tokens(&format!("a{pair} "), 100))
            .await
            .unwrap();
    }

    let view = store.messages_for_llm();
    assert_eq!(view[0].role, Role::System);
    assert_eq!(view.len(), 4, "system plus exactly 3 recent messages");
    assert_eq!(store.total_tokens(), system_tokens + 300);

    // The retained tail is the most recent three.
    assert!(view[1].content.starts_with("a3"));
    assert!(view[2].content.starts_with("u4"));
    assert!(view[3].content.starts_with("a4"));
}

#[tokio::test]
async fn sliding_window_with_max_messages_one_keeps_single_message() {
    let mut store = store(
        10_000,
        PruningStrategy::SlidingWindow(SlidingWindowConfig {
            max_messages: 1,
            preserve_system_message: true,
        }),
    );
    // Budget is generous, so force prunes explicitly.
    for i in 0..8 {
        store
            .add_message(Message::user(format!("message {i}")))
            .await
            .unwrap();
        store.prune().await.unwrap();
    }

    let view = store.messages_for_llm();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].content, "message 7");
}

#[tokio::test]
async fn sliding_window_never_drops_below_one_regular_message() {
    let mut store = store(
        10,
        PruningStrategy::SlidingWindow(SlidingWindowConfig {
            max_messages: 5,
            preserve_system_message: true,
        }),
    );

    store.add_message(message_of_tokens("big ", 500)).await.unwrap();
    store.add_message(message_of_tokens("bigger ", 500)).await.unwrap();

    // Over budget, but one regular message must survive.
    let view = store.messages_for_llm();
    assert_eq!(view.len(), 1);
    assert!(view[0].content.starts_with("bigger"));
}

#[tokio::test]
async fn prune_invariant_under_budget_or_single_message() {
    let mut store = store(
        120,
        PruningStrategy::SlidingWindow(SlidingWindowConfig {
            max_messages: 50,
            preserve_system_message: true,
        }),
    );

    for i in 0..10 {
        store
            .add_message(message_of_tokens(&format!("m{i} "), 40))
            .await
            .unwrap();
        let under_budget = store.total_tokens() <= 120;
        let single = store.messages_for_llm().len() == 1;
        assert!(under_budget || single);
    }
}

#[tokio::test]
async fn priority_prune_evicts_low_priority_first() {
    let mut store = store(
        250,
        PruningStrategy::PriorityBased(PriorityConfig {
            preserve_system_message: true,
        }),
    );

    store
        .add_message(message_of_tokens("keep ", 100).with_priority(MessagePriority::Critical))
        .await
        .unwrap();
    store
        .add_message(message_of_tokens("shed ", 100).with_priority(MessagePriority::Low))
        .await
        .unwrap();
    store
        .add_message(message_of_tokens("tail ", 100).with_priority(MessagePriority::Normal))
        .await
        .unwrap();

    let contents: Vec<String> = store
        .messages_for_llm()
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(contents.len(), 2);
    assert!(contents[0].starts_with("keep"));
    assert!(contents[1].starts_with("tail"));
    assert!(store.total_tokens() <= 250);
}

#[tokio::test]
async fn zero_budget_priority_prune_leaves_only_system() {
    let mut store = store(
        0,
        PruningStrategy::PriorityBased(PriorityConfig {
            preserve_system_message: true,
        }),
    );

    store.add_message(Message::system("sys")).await.unwrap();
    store.add_message(Message::user("one")).await.unwrap();
    store.add_message(Message::user("two")).await.unwrap();

    let view = store.messages_for_llm();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].role, Role::System);
}

#[tokio::test]
async fn preserved_system_message_survives_every_prune() {
    let mut store = store(
        100,
        PruningStrategy::PriorityBased(PriorityConfig {
            preserve_system_message: true,
        }),
    );

    store.add_message(Message::system("always here")).await.unwrap();
    for i in 0..6 {
        store
            .add_message(message_of_tokens(&format!("m{i} "), 80))
            .await
            .unwrap();
        let report = store.prune().await.unwrap();
        assert!(report
            .kept
            .iter()
            .any(|m| m.role == Role::System && m.content == "always here"));
    }
}

#[tokio::test]
async fn summary_prune_synthesises_and_counts_summary_tokens() {
    let mut store = ContextStore::new(ContextConfig {
        max_tokens: 300,
        auto_prune: false,
        strategy: PruningStrategy::SummaryBased(SummaryConfig {
            window: 4,
            preserve_system_message: true,
        }),
    })
    .with_summarizer(Arc::new(FixedSummarizer));

    for i in 0..6 {
        store
            .add_message(message_of_tokens(&format!("m{i} "), 80))
            .await
            .unwrap();
    }

    let report = store.prune().await.unwrap();
    assert_eq!(report.strategy, "summary_based");
    assert!(report.removed_count >= 4);
    assert_eq!(report.metadata["summary_inserted"], true);

    let view = store.messages_for_llm();
    assert!(view[0].content.starts_with("[Conversation summary]"));
    assert_eq!(view[0].priority, MessagePriority::High);
    assert!(view[0].tokens > 0);

    let expected: u32 = view.iter().map(|m| m.tokens).sum();
    assert_eq!(store.total_tokens(), expected);
}

#[tokio::test]
async fn summary_prune_degrades_gracefully_when_llm_fails() {
    let mut store = ContextStore::new(ContextConfig {
        max_tokens: 100,
        auto_prune: false,
        strategy: PruningStrategy::SummaryBased(SummaryConfig {
            window: 2,
            preserve_system_message: true,
        }),
    })
    .with_summarizer(Arc::new(FailingSummarizer));

    for i in 0..4 {
        store
            .add_message(message_of_tokens(&format!("m{i} "), 60))
            .await
            .unwrap();
    }

    let report = store.prune().await.unwrap();
    assert_eq!(report.metadata["summary_inserted"], false);
    assert!(report.removed_count >= 2);
    assert!(store.total_tokens() <= 100 || store.messages_for_llm().len() == 1);
}

#[tokio::test]
async fn summary_prune_without_client_is_an_error() {
    let mut store = ContextStore::new(ContextConfig {
        max_tokens: 10,
        auto_prune: false,
        strategy: PruningStrategy::SummaryBased(SummaryConfig::default()),
    });
    store.add_message(Message::user("a")).await.unwrap();
    store.add_message(Message::user("b")).await.unwrap();

    assert!(store.prune().await.is_err());
}

#[tokio::test]
async fn semantic_prune_evicts_least_similar_messages() {
    let mut store = ContextStore::new(ContextConfig {
        max_tokens: 120,
        auto_prune: false,
        strategy: PruningStrategy::Semantic(SemanticConfig {
            min_similarity: 0.3,
            recent_window: 2,
            preserve_system_message: true,
        }),
    })
    .with_embedder(Arc::new(TopicEmbedder));

    // Old off-topic chatter, then on-topic recent content about cats.
    store
        .add_message(message_of_tokens("weather talk ", 60))
        .await
        .unwrap();
    store
        .add_message(message_of_tokens("cats are great ", 60))
        .await
        .unwrap();
    store
        .add_message(message_of_tokens("more cats here ", 40))
        .await
        .unwrap();
    store
        .add_message(message_of_tokens("cats again ", 40))
        .await
        .unwrap();

    store.prune().await.unwrap();

    let contents: Vec<String> = store
        .messages_for_llm()
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert!(
        contents.iter().all(|c| c.contains("cats")),
        "off-topic message should be evicted first: {contents:?}"
    );
    assert!(store.total_tokens() <= 120);
}
