//! Scenario: for each conversation store backend, create a thread, append
//! events, `set`, `get`, assert equality, `delete`, assert `get` returns
//! nothing.

use agentcore::{
    ConversationStore, DocumentConversationStore, EventType, FileConversationStore,
    SqlConversationStore, Thread,
};
use serde_json::json;

fn sample_thread() -> Thread {
    let mut thread = Thread::new();
    thread.add_event(EventType::UserInput, json!("hello there"), None);
    thread.add_event(
        EventType::LlmResponse,
        json!({"intent": "done"}),
        Some("tool_selection"),
    );
    thread
}

#[tokio::test]
async fn file_backend_upserts_retrieves_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileConversationStore::new(dir.path()).unwrap();
    let thread = sample_thread();

    store.set(&thread).await.unwrap();
    let fetched = store.get(thread.thread_id()).await.unwrap().unwrap();
    assert_eq!(fetched.thread_id(), thread.thread_id());
    assert_eq!(fetched.events.len(), thread.events.len());

    store.delete(thread.thread_id()).await.unwrap();
    assert!(store.get(thread.thread_id()).await.unwrap().is_none());

    // Deleting an id that was never present is not an error.
    store.delete(thread.thread_id()).await.unwrap();
}

#[tokio::test]
async fn sql_backend_upserts_retrieves_and_deletes() {
    let store = SqlConversationStore::open_in_memory().unwrap();
    let thread = sample_thread();

    store.set(&thread).await.unwrap();
    let fetched = store.get(thread.thread_id()).await.unwrap().unwrap();
    assert_eq!(fetched.thread_id(), thread.thread_id());
    assert_eq!(fetched.events.len(), thread.events.len());

    store.delete(thread.thread_id()).await.unwrap();
    assert!(store.get(thread.thread_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn document_backend_upserts_retrieves_and_deletes() {
    let store = DocumentConversationStore::in_memory("agentcore_tests", "conversations")
        .await
        .unwrap();
    let thread = sample_thread();

    store.set(&thread).await.unwrap();
    let fetched = store.get(thread.thread_id()).await.unwrap().unwrap();
    assert_eq!(fetched.thread_id(), thread.thread_id());
    assert_eq!(fetched.events.len(), thread.events.len());

    store.delete(thread.thread_id()).await.unwrap();
    assert!(store.get(thread.thread_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn set_is_a_full_overwrite_not_a_merge() {
    let store = SqlConversationStore::open_in_memory().unwrap();
    let mut thread = sample_thread();
    store.set(&thread).await.unwrap();

    thread.add_event(EventType::ToolResponse, json!({"response": 7}), None);
    store.set(&thread).await.unwrap();

    let fetched = store.get(thread.thread_id()).await.unwrap().unwrap();
    assert_eq!(fetched.events.len(), 3);
}

#[tokio::test]
async fn all_enumerates_every_stored_thread_across_backends() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = FileConversationStore::new(dir.path()).unwrap();
    let a = sample_thread();
    let b = sample_thread();
    file_store.set(&a).await.unwrap();
    file_store.set(&b).await.unwrap();
    assert_eq!(file_store.all().await.unwrap().len(), 2);

    let sql_store = SqlConversationStore::open_in_memory().unwrap();
    sql_store.set(&a).await.unwrap();
    sql_store.set(&b).await.unwrap();
    assert_eq!(sql_store.all().await.unwrap().len(), 2);
}
