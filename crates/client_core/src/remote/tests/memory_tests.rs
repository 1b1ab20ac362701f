use super::*;
use serde_json::json;

#[tokio::test]
async fn subscribe_sends_current_value_first() {
    let store = MemoryDocumentStore::with_document("board", json!({ "S": [] }));
    let mut subscription = store.subscribe("board").await.expect("subscribe");
    assert_eq!(
        subscription.next().await,
        Some(RemoteEvent::Snapshot(Some(json!({ "S": [] }))))
    );

    let mut empty = store.subscribe("other").await.expect("subscribe");
    assert_eq!(empty.next().await, Some(RemoteEvent::Snapshot(None)));
}

#[tokio::test]
async fn publish_replaces_document_and_echoes() {
    let store = MemoryDocumentStore::new();
    let mut subscription = store.subscribe("board").await.expect("subscribe");
    let _initial = subscription.next().await;

    store
        .publish("board", json!({ "v": 1 }))
        .await
        .expect("publish");
    store
        .publish("board", json!({ "v": 2 }))
        .await
        .expect("publish");

    assert_eq!(store.publish_count(), 2);
    assert_eq!(store.document("board"), Some(json!({ "v": 2 })));
    assert_eq!(
        subscription.next().await,
        Some(RemoteEvent::Snapshot(Some(json!({ "v": 1 }))))
    );
    assert_eq!(
        subscription.next().await,
        Some(RemoteEvent::Snapshot(Some(json!({ "v": 2 }))))
    );
}

#[tokio::test]
async fn external_writes_reach_subscribers_without_counting() {
    let store = MemoryDocumentStore::new();
    let mut subscription = store.subscribe("board").await.expect("subscribe");
    let _initial = subscription.next().await;

    store.write_external("board", Some(json!({ "from": "peer" })));
    store.write_external("board", None);

    assert_eq!(store.publish_count(), 0);
    assert_eq!(
        subscription.next().await,
        Some(RemoteEvent::Snapshot(Some(json!({ "from": "peer" }))))
    );
    assert_eq!(subscription.next().await, Some(RemoteEvent::Snapshot(None)));
    assert_eq!(store.document("board"), None);
}

#[tokio::test]
async fn unreachable_store_fails_calls_and_notifies_subscribers() {
    let store = MemoryDocumentStore::new();
    let mut subscription = store.subscribe("board").await.expect("subscribe");
    let _initial = subscription.next().await;

    store.set_unreachable(true);
    assert!(matches!(
        subscription.next().await,
        Some(RemoteEvent::Failed(RemoteError::Unreachable(_)))
    ));
    assert!(matches!(
        store.publish("board", json!({})).await,
        Err(RemoteError::Unreachable(_))
    ));
    assert!(store.subscribe("board").await.is_err());
    assert_eq!(store.publish_count(), 0);

    store.set_unreachable(false);
    store.publish("board", json!({})).await.expect("publish");
    assert_eq!(store.publish_count(), 1);
}

#[tokio::test]
async fn unsubscribed_receivers_are_pruned() {
    let store = MemoryDocumentStore::new();
    let mut subscription = store.subscribe("board").await.expect("subscribe");
    assert_eq!(store.subscriber_count("board"), 1);

    subscription.unsubscribe();
    assert_eq!(store.subscriber_count("board"), 0);
    store
        .publish("board", json!({ "v": 1 }))
        .await
        .expect("publish");
    assert_eq!(subscription.next().await, None);
}
