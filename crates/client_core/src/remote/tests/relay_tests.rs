use super::*;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::error::ErrorCode;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, sync::broadcast};

#[derive(Clone)]
struct FakeRelay {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    api_keys: Arc<Mutex<Vec<String>>>,
    revision: Arc<Mutex<i64>>,
    events: broadcast::Sender<DocumentEvent>,
    disconnect: broadcast::Sender<()>,
}

#[derive(Deserialize)]
struct WsQuery {
    path: String,
}

async fn put_document(
    State(relay): State<FakeRelay>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<WriteAck>, (StatusCode, Json<ApiError>)> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        relay.api_keys.lock().expect("lock").push(key.to_string());
    }
    if path == "readonly" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, "document is read-only")),
        ));
    }
    let path = DocumentPath::parse(&path).map_err(|e| (StatusCode::BAD_REQUEST, Json(e)))?;
    relay
        .documents
        .lock()
        .expect("lock")
        .insert(path.to_string(), body.clone());
    let revision = {
        let mut revision = relay.revision.lock().expect("lock");
        *revision += 1;
        *revision
    };
    let _ = relay.events.send(DocumentEvent::Changed {
        path: path.clone(),
        revision,
        value: Some(body),
    });
    Ok(Json(WriteAck {
        path,
        revision,
        updated_at: Utc::now(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(relay): State<FakeRelay>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(relay, socket, q.path))
}

async fn ws_connection(relay: FakeRelay, mut socket: WebSocket, path: String) {
    let mut events = relay.events.subscribe();
    let mut disconnect = relay.disconnect.subscribe();
    let current = relay.documents.lock().expect("lock").get(&path).cloned();
    let Ok(path) = DocumentPath::parse(&path) else {
        return;
    };
    let initial = DocumentEvent::Changed {
        path: path.clone(),
        revision: 0,
        value: current,
    };
    let text = serde_json::to_string(&initial).expect("encode");
    if socket.send(WsMessage::Text(text)).await.is_err() {
        return;
    }
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Ok(event) => event,
                Err(_) => return,
            },
            _ = disconnect.recv() => {
                let _ = socket.send(WsMessage::Close(None)).await;
                return;
            }
        };
        if event.path().is_some_and(|changed| changed != &path) {
            continue;
        }
        let text = serde_json::to_string(&event).expect("encode");
        if socket.send(WsMessage::Text(text)).await.is_err() {
            return;
        }
    }
}

async fn spawn_fake_relay() -> (String, FakeRelay) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (events, _) = broadcast::channel(16);
    let (disconnect, _) = broadcast::channel(1);
    let relay = FakeRelay {
        documents: Arc::new(Mutex::new(HashMap::new())),
        api_keys: Arc::new(Mutex::new(Vec::new())),
        revision: Arc::new(Mutex::new(0)),
        events,
        disconnect,
    };
    let app = Router::new()
        .route("/documents/*path", put(put_document))
        .route("/ws", get(ws_handler))
        .with_state(relay.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), relay)
}

fn store_for(url: &str, api_key: Option<&str>) -> RelayDocumentStore {
    RelayDocumentStore::new(&RemoteConfig {
        database_url: Some(url.to_string()),
        api_key: api_key.map(str::to_string),
        ..RemoteConfig::default()
    })
    .expect("valid config")
}

async fn next_event(subscription: &mut Subscription) -> RemoteEvent {
    tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("event in time")
        .expect("subscription open")
}

#[test]
fn builds_document_and_socket_urls() {
    let store = store_for("https://relay.example.com/base", None);
    let path = DocumentPath::parse("boards/friday").expect("path");
    assert_eq!(
        store.document_url(&path).expect("url").as_str(),
        "https://relay.example.com/base/documents/boards/friday"
    );
    assert_eq!(
        store.subscribe_url(&path).expect("url").as_str(),
        "wss://relay.example.com/base/ws?path=boards%2Ffriday"
    );

    let plain = store_for("http://127.0.0.1:8787", None);
    assert_eq!(
        plain.subscribe_url(&path).expect("url").as_str(),
        "ws://127.0.0.1:8787/ws?path=boards%2Ffriday"
    );
}

#[test]
fn rejects_non_http_database_url() {
    let result = RelayDocumentStore::new(&RemoteConfig {
        database_url: Some("ws://relay.example.com".into()),
        ..RemoteConfig::default()
    });
    assert!(matches!(result, Err(ConfigError::InvalidDatabaseUrl(_))));
}

#[tokio::test]
async fn publish_reaches_subscriber_with_api_key() {
    let (url, relay) = spawn_fake_relay().await;
    let store = store_for(&url, Some("key-123"));

    let mut subscription = store.subscribe("tierlist").await.expect("subscribe");
    assert_eq!(
        next_event(&mut subscription).await,
        RemoteEvent::Snapshot(None)
    );

    store
        .publish("tierlist", json!({ "version": 2, "tiers": {} }))
        .await
        .expect("publish");
    assert_eq!(
        next_event(&mut subscription).await,
        RemoteEvent::Snapshot(Some(json!({ "version": 2, "tiers": {} })))
    );
    assert_eq!(
        relay.api_keys.lock().expect("lock").as_slice(),
        ["key-123".to_string()]
    );
}

#[tokio::test]
async fn rejected_publish_carries_relay_message() {
    let (url, _relay) = spawn_fake_relay().await;
    let store = store_for(&url, None);
    let err = store
        .publish("readonly", json!({}))
        .await
        .expect_err("rejected");
    assert_eq!(err, RemoteError::Rejected("document is read-only".into()));
}

#[tokio::test]
async fn unreachable_relay_fails_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let store = store_for(&format!("http://{addr}"), None);
    assert!(matches!(
        store.subscribe("tierlist").await,
        Err(RemoteError::Unreachable(_))
    ));
    assert!(matches!(
        store.publish("tierlist", json!({})).await,
        Err(RemoteError::Unreachable(_))
    ));
}

#[tokio::test]
async fn older_revisions_arriving_late_are_skipped() {
    let (url, relay) = spawn_fake_relay().await;
    let store = store_for(&url, None);
    let mut subscription = store.subscribe("tierlist").await.expect("subscribe");
    assert_eq!(
        next_event(&mut subscription).await,
        RemoteEvent::Snapshot(None)
    );

    let path = DocumentPath::parse("tierlist").expect("path");
    for (revision, name) in [(2, "b"), (1, "a"), (3, "c")] {
        relay
            .events
            .send(DocumentEvent::Changed {
                path: path.clone(),
                revision,
                value: Some(json!({ "name": name })),
            })
            .expect("subscriber connected");
    }

    assert_eq!(
        next_event(&mut subscription).await,
        RemoteEvent::Snapshot(Some(json!({ "name": "b" })))
    );
    assert_eq!(
        next_event(&mut subscription).await,
        RemoteEvent::Snapshot(Some(json!({ "name": "c" })))
    );
}

#[tokio::test]
async fn lost_socket_reconnects_and_resends_current_value() {
    let (url, relay) = spawn_fake_relay().await;
    let store = store_for(&url, None).with_reconnect_delay(Duration::from_millis(20));
    store
        .publish("tierlist", json!({ "version": 2, "tiers": {} }))
        .await
        .expect("publish");

    let mut subscription = store.subscribe("tierlist").await.expect("subscribe");
    let current = RemoteEvent::Snapshot(Some(json!({ "version": 2, "tiers": {} })));
    assert_eq!(next_event(&mut subscription).await, current);

    relay.disconnect.send(()).expect("socket connected");
    assert!(matches!(
        next_event(&mut subscription).await,
        RemoteEvent::Failed(_)
    ));
    assert_eq!(next_event(&mut subscription).await, current);
    assert!(!subscription.is_cancelled());
}
