use loom_context::{ContextConfig, ContextStore, PruningStrategy, EXPORT_VERSION};
use loom_core::Message;

fn basic_store() -> ContextStore {
    ContextStore::new(ContextConfig {
        max_tokens: 4096,
        auto_prune: false,
        strategy: PruningStrategy::default(),
    })
}

#[tokio::test]
async fn export_import_round_trips_exactly() {
    let mut store = basic_store();
    store.add_message(Message::system("system prompt")).await.unwrap();
    store.add_message(Message::user("hello")).await.unwrap();
    store.add_message(Message::assistant("hi there", None)).await.unwrap();
    store.prune().await.unwrap();

    let exported = store.export();
    let imported = ContextStore::import(exported.clone()).unwrap();
    let re_exported = imported.export();

    assert_eq!(
        serde_json::to_value(&exported).unwrap(),
        serde_json::to_value(&re_exported).unwrap()
    );
}

#[tokio::test]
async fn import_restores_state_and_accounting() {
    let mut store = basic_store();
    store.add_message(Message::user("remember me")).await.unwrap();
    let total = store.total_tokens();

    let imported = ContextStore::import(store.export()).unwrap();

    assert_eq!(imported.total_tokens(), total);
    assert_eq!(imported.messages_for_llm().len(), 1);
    assert_eq!(imported.messages_for_llm()[0].content, "remember me");
}

#[tokio::test]
async fn import_rejects_major_version_mismatch() {
    let store = basic_store();
    let mut snapshot = store.export();
    snapshot.version = "2.0.0".to_string();

    let result = ContextStore::import(snapshot);
    assert!(result.is_err());
}

#[tokio::test]
async fn import_accepts_minor_version_drift() {
    let store = basic_store();
    let mut snapshot = store.export();
    snapshot.version = "1.9.3".to_string();

    assert!(ContextStore::import(snapshot).is_ok());
}

#[test]
fn export_version_is_semver_shaped() {
    let segments: Vec<&str> = EXPORT_VERSION.split('.').collect();
    assert_eq!(segments.len(), 3);
    segments[0].parse::<u32>().unwrap();
}
