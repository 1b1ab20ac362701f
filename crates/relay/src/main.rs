use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{DocumentEvent, DocumentPath, WriteAck},
};
use storage::Storage;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::{
    current_document, documents_route, parse_path, remove_document, replace_document, ApiContext,
};
use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WsQuery {
    path: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let (events, _) = broadcast::channel(settings.event_capacity);

    let state = AppState::new(ApiContext { storage }, events);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            documents_route(),
            get(get_document).put(put_document).delete(delete_document),
        )
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_DOCUMENT_BYTES))
        .with_state(state)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        error_response(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(raw_path): Path<String>,
) -> ApiResult<Json<Value>> {
    let path = parse_path(&raw_path).map_err(error_response)?;
    match current_document(&state.api, &path)
        .await
        .map_err(error_response)?
    {
        DocumentEvent::Changed { value, .. } => Ok(Json(value.unwrap_or(Value::Null))),
        DocumentEvent::Error(err) => Err(error_response(err)),
    }
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    Path(raw_path): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<WriteAck>> {
    let path = parse_path(&raw_path).map_err(error_response)?;
    let _write = state.writes.lock().await;
    let (ack, event) = replace_document(&state.api, &path, body)
        .await
        .map_err(error_response)?;
    // No subscribers is fine; the write is already durable.
    let _ = state.events.send(event);
    Ok(Json(ack))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(raw_path): Path<String>,
) -> ApiResult<StatusCode> {
    let path = parse_path(&raw_path).map_err(error_response)?;
    let _write = state.writes.lock().await;
    let event = remove_document(&state.api, &path)
        .await
        .map_err(error_response)?;
    let _ = state.events.send(event);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> ApiResult<impl IntoResponse> {
    let path = parse_path(&q.path).map_err(error_response)?;
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, path)))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, path: DocumentPath) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the current value so no write slips in between.
    let mut events_rx = state.events.subscribe();
    debug!(%path, "subscriber connected");

    let task_path = path.clone();
    let send_task = tokio::spawn(async move {
        let path = task_path;
        let initial = snapshot_event(&state.api, &path).await;
        if !send_event(&mut sender, &initial).await {
            return;
        }

        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%path, skipped, "subscriber lagged; resending current document");
                    snapshot_event(&state.api, &path).await
                }
                Err(RecvError::Closed) => break,
            };
            if event.path().is_some_and(|changed| changed != &path) {
                continue;
            }
            if !send_event(&mut sender, &event).await {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    debug!(%path, "subscriber disconnected");
}

async fn snapshot_event(api: &ApiContext, path: &DocumentPath) -> DocumentEvent {
    current_document(api, path)
        .await
        .unwrap_or_else(DocumentEvent::Error)
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &DocumentEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(v) => v,
        Err(error) => {
            error!(%error, "failed to encode document event");
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
