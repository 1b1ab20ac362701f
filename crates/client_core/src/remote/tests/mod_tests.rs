use super::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn delivers_events_in_order() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut subscription = Subscription::new(rx, None);
    tx.send(RemoteEvent::Snapshot(None)).expect("send");
    tx.send(RemoteEvent::Snapshot(Some(json!({ "a": 1 }))))
        .expect("send");

    assert_eq!(subscription.next().await, Some(RemoteEvent::Snapshot(None)));
    assert_eq!(
        subscription.next().await,
        Some(RemoteEvent::Snapshot(Some(json!({ "a": 1 }))))
    );
}

#[tokio::test]
async fn unsubscribe_drops_buffered_events_and_is_idempotent() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut subscription = Subscription::new(rx, None);
    tx.send(RemoteEvent::Snapshot(None)).expect("send");

    subscription.unsubscribe();
    subscription.unsubscribe();

    assert!(subscription.is_cancelled());
    assert_eq!(subscription.next().await, None);
    assert!(tx.send(RemoteEvent::Snapshot(None)).is_err());
}

#[tokio::test]
async fn dropping_subscription_stops_forwarder() {
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(async move {
        loop {
            if tx.send(RemoteEvent::Snapshot(None)).is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
    let abort = forwarder.abort_handle();
    let subscription = Subscription::new(rx, Some(forwarder));
    drop(subscription);

    tokio::time::timeout(Duration::from_secs(1), async {
        while !abort.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("forwarder stopped");
}

#[test]
fn rejects_invalid_paths() {
    assert!(matches!(
        document_path("../etc"),
        Err(RemoteError::Rejected(_))
    ));
    assert_eq!(
        document_path("/boards/friday/").expect("valid").as_str(),
        "boards/friday"
    );
}
